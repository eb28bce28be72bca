//! Installable endpoints.
//!
//! Creating an installable makes the caller its owner (a user grant with
//! every permission bit). Linking an existing revision, or a tag another
//! installable already links, requires the right to update that record.
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::api::crud::{self, CreatorGrant, NewRecord, Resource};
use crate::api::error::ApiError;
use crate::api::types::{ErrorResponse, ListParams, ListResponse, NumModified};
use crate::app::AppState;
use crate::model::{Installable, InstallableCreate};

impl Resource for Installable {
    type Create = InstallableCreate;

    const FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "description",
        "remote_repository_url",
        "homepage_url",
        "repository_type",
        "tag_ids",
        "revision_ids",
    ];
    const PATCHABLE: &'static [&'static str] = &[
        "name",
        "description",
        "remote_repository_url",
        "homepage_url",
        "repository_type",
        "tag_ids",
        "revision_ids",
    ];
    const CREATOR_GRANT: Option<CreatorGrant> = Some(CreatorGrant::OwnInstallable);

    fn from_create(create: InstallableCreate) -> NewRecord<Self> {
        NewRecord::unlinked(Installable {
            id: 0,
            name: create.name,
            description: create.description,
            remote_repository_url: create.remote_repository_url,
            homepage_url: create.homepage_url,
            repository_type: create.repository_type,
            tag_ids: create.tag_ids,
            revision_ids: create.revision_ids,
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/installable",
    tag = "installable",
    params(ListParams),
    responses(
        (status = 200, description = "Installables visible to the caller", body = ListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_installables(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    crud::list::<Installable>(&state, &headers, params)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/installable",
    tag = "installable",
    request_body = InstallableCreate,
    responses(
        (status = 201, description = "Installable created; caller owns it", body = Installable),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn create_installable(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = crud::create::<Installable>(&state, &headers, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/api/installable",
    tag = "installable",
    params(ListParams),
    request_body = Object,
    responses(
        (status = 200, description = "Every matched installable updated", body = NumModified),
        (status = 401, description = "At least one match is not administered by the caller", body = ErrorResponse)
    )
)]
pub async fn update_installables(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
    body: Bytes,
) -> Result<Json<NumModified>, ApiError> {
    crud::update_many::<Installable>(&state, &headers, params, body)
        .await
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/api/installable/{id}",
    tag = "installable",
    params(("id" = i64, Path, description = "Installable id")),
    responses(
        (status = 200, description = "Installable", body = Installable),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_installable(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    crud::get::<Installable>(&state, &headers, id).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/installable/{id}",
    tag = "installable",
    params(("id" = i64, Path, description = "Installable id")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated installable", body = Installable),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_installable(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    crud::update::<Installable>(&state, &headers, id, body)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/installable/{id}",
    tag = "installable",
    params(("id" = i64, Path, description = "Installable id")),
    responses(
        (status = 204, description = "Installable, its grants and its suite revisions deleted"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_installable(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    crud::delete::<Installable>(&state, &headers, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
