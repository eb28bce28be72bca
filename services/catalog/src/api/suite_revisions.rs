//! Suite revision endpoints. A suite revision belongs to exactly one
//! installable, which governs it; the owner cannot be changed afterwards.
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::api::crud::{self, NewRecord, Resource};
use crate::api::error::ApiError;
use crate::api::types::{ErrorResponse, ListParams, ListResponse, NumModified};
use crate::app::AppState;
use crate::model::{SuiteRevision, SuiteRevisionCreate};

impl Resource for SuiteRevision {
    type Create = SuiteRevisionCreate;

    const FIELDS: &'static [&'static str] = &[
        "id",
        "version",
        "commit_message",
        "installable",
        "contained_revision_ids",
    ];
    const PATCHABLE: &'static [&'static str] =
        &["version", "commit_message", "contained_revision_ids"];

    fn from_create(create: SuiteRevisionCreate) -> NewRecord<Self> {
        NewRecord::unlinked(SuiteRevision {
            id: 0,
            version: create.version,
            commit_message: create.commit_message,
            installable: create.installable,
            contained_revision_ids: create.contained_revision_ids,
        })
    }

    fn governing_on_create(new: &NewRecord<Self>) -> Vec<i64> {
        vec![new.record.installable]
    }
}

#[utoipa::path(
    get,
    path = "/api/suite_revision",
    tag = "suite_revision",
    params(ListParams),
    responses(
        (status = 200, description = "Suite revisions visible to the caller", body = ListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_suite_revisions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    crud::list::<SuiteRevision>(&state, &headers, params)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/suite_revision",
    tag = "suite_revision",
    request_body = SuiteRevisionCreate,
    responses(
        (status = 201, description = "Suite revision created", body = SuiteRevision),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn create_suite_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = crud::create::<SuiteRevision>(&state, &headers, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/api/suite_revision",
    tag = "suite_revision",
    params(ListParams),
    request_body = Object,
    responses(
        (status = 200, description = "Every matched suite revision updated", body = NumModified),
        (status = 401, description = "At least one match is not administered by the caller", body = ErrorResponse)
    )
)]
pub async fn update_suite_revisions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
    body: Bytes,
) -> Result<Json<NumModified>, ApiError> {
    crud::update_many::<SuiteRevision>(&state, &headers, params, body)
        .await
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/api/suite_revision/{id}",
    tag = "suite_revision",
    params(("id" = i64, Path, description = "Suite revision id")),
    responses(
        (status = 200, description = "Suite revision", body = SuiteRevision),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_suite_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    crud::get::<SuiteRevision>(&state, &headers, id).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/suite_revision/{id}",
    tag = "suite_revision",
    params(("id" = i64, Path, description = "Suite revision id")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated suite revision", body = SuiteRevision),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_suite_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    crud::update::<SuiteRevision>(&state, &headers, id, body)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/suite_revision/{id}",
    tag = "suite_revision",
    params(("id" = i64, Path, description = "Suite revision id")),
    responses(
        (status = 204, description = "Suite revision deleted"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_suite_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    crud::delete::<SuiteRevision>(&state, &headers, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
