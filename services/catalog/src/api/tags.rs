//! Tag endpoints.
//!
//! A tag is governed by every installable that links it. A new tag may be
//! linked into installables at creation (`installable_ids`), which needs
//! write access to each of them; an unlinked tag can be created by anyone
//! signed in.
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::api::crud::{self, NewRecord, Resource};
use crate::api::error::ApiError;
use crate::api::types::{ErrorResponse, ListParams, ListResponse, NumModified};
use crate::app::AppState;
use crate::model::{Tag, TagCreate};

impl Resource for Tag {
    type Create = TagCreate;

    const FIELDS: &'static [&'static str] = &["id", "display_name", "description"];
    const PATCHABLE: &'static [&'static str] = &["display_name", "description"];

    fn from_create(create: TagCreate) -> NewRecord<Self> {
        NewRecord {
            record: Tag {
                id: 0,
                display_name: create.display_name,
                description: create.description,
            },
            link_into: create.installable_ids,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/tag",
    tag = "tag",
    params(ListParams),
    responses(
        (status = 200, description = "Tags visible to the caller", body = ListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    crud::list::<Tag>(&state, &headers, params)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/tag",
    tag = "tag",
    request_body = TagCreate,
    responses(
        (status = 201, description = "Tag created", body = Tag),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn create_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = crud::create::<Tag>(&state, &headers, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/api/tag",
    tag = "tag",
    params(ListParams),
    request_body = Object,
    responses(
        (status = 200, description = "Every matched tag updated", body = NumModified),
        (status = 401, description = "At least one match is not administered by the caller", body = ErrorResponse)
    )
)]
pub async fn update_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
    body: Bytes,
) -> Result<Json<NumModified>, ApiError> {
    crud::update_many::<Tag>(&state, &headers, params, body)
        .await
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/api/tag/{id}",
    tag = "tag",
    params(("id" = i64, Path, description = "Tag id")),
    responses(
        (status = 200, description = "Tag", body = Tag),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    crud::get::<Tag>(&state, &headers, id).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/tag/{id}",
    tag = "tag",
    params(("id" = i64, Path, description = "Tag id")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated tag", body = Tag),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    crud::update::<Tag>(&state, &headers, id, body)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/tag/{id}",
    tag = "tag",
    params(("id" = i64, Path, description = "Tag id")),
    responses(
        (status = 204, description = "Tag deleted"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    crud::delete::<Tag>(&state, &headers, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
