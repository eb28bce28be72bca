//! Revision endpoints.
//!
//! Revisions are governed by the installables that link them. Creating one
//! requires `installable_ids` naming at least one installable the caller may
//! write to. Private revisions are readable only with a read grant on every
//! governing installable.
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::api::crud::{self, NewRecord, Resource};
use crate::api::error::ApiError;
use crate::api::types::{ErrorResponse, ListParams, ListResponse, NumModified};
use crate::app::AppState;
use crate::model::{Revision, RevisionCreate};

impl Resource for Revision {
    type Create = RevisionCreate;

    const FIELDS: &'static [&'static str] = &[
        "id",
        "version",
        "commit_message",
        "public",
        "uploaded",
        "tar_gz_sha256",
        "tar_gz_sig_available",
        "replacement_revision",
    ];
    const PATCHABLE: &'static [&'static str] = &[
        "version",
        "commit_message",
        "public",
        "tar_gz_sha256",
        "tar_gz_sig_available",
        "replacement_revision",
    ];

    fn from_create(create: RevisionCreate) -> NewRecord<Self> {
        NewRecord {
            record: Revision {
                id: 0,
                version: create.version,
                commit_message: create.commit_message,
                public: create.public,
                uploaded: chrono::Utc::now(),
                tar_gz_sha256: create.tar_gz_sha256,
                tar_gz_sig_available: create.tar_gz_sig_available,
                replacement_revision: create.replacement_revision,
            },
            link_into: create.installable_ids,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/revision",
    tag = "revision",
    params(ListParams),
    responses(
        (status = 200, description = "Revisions visible to the caller", body = ListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_revisions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    crud::list::<Revision>(&state, &headers, params)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/revision",
    tag = "revision",
    request_body = RevisionCreate,
    responses(
        (status = 201, description = "Revision created", body = Revision),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn create_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = crud::create::<Revision>(&state, &headers, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/api/revision",
    tag = "revision",
    params(ListParams),
    request_body = Object,
    responses(
        (status = 200, description = "Every matched revision updated", body = NumModified),
        (status = 401, description = "At least one match is not administered by the caller", body = ErrorResponse)
    )
)]
pub async fn update_revisions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
    body: Bytes,
) -> Result<Json<NumModified>, ApiError> {
    crud::update_many::<Revision>(&state, &headers, params, body)
        .await
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/api/revision/{id}",
    tag = "revision",
    params(("id" = i64, Path, description = "Revision id")),
    responses(
        (status = 200, description = "Revision", body = Revision),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    crud::get::<Revision>(&state, &headers, id).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/revision/{id}",
    tag = "revision",
    params(("id" = i64, Path, description = "Revision id")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated revision", body = Revision),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    crud::update::<Revision>(&state, &headers, id, body)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/revision/{id}",
    tag = "revision",
    params(("id" = i64, Path, description = "Revision id")),
    responses(
        (status = 204, description = "Revision deleted"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    crud::delete::<Revision>(&state, &headers, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
