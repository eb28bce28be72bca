//! Group endpoints.
//!
//! The creator of a group becomes a member with every permission bit.
//! Membership bits decide who may modify or delete the group; read
//! responses never include the group's `api_key`.
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::api::crud::{self, CreatorGrant, NewRecord, Resource};
use crate::api::error::ApiError;
use crate::api::types::{ErrorResponse, ListParams, ListResponse, NumModified};
use crate::app::AppState;
use crate::auth::keys::generate_api_key;
use crate::model::{Group, GroupCreate};

impl Resource for Group {
    type Create = GroupCreate;

    const FIELDS: &'static [&'static str] = &[
        "id",
        "display_name",
        "description",
        "website",
        "gpg_pubkey_id",
    ];
    const PATCHABLE: &'static [&'static str] =
        &["display_name", "description", "website", "gpg_pubkey_id"];
    const REDACTED: &'static [&'static str] = &["api_key"];
    const CREATOR_GRANT: Option<CreatorGrant> = Some(CreatorGrant::AdministerGroup);

    fn from_create(create: GroupCreate) -> NewRecord<Self> {
        NewRecord::unlinked(Group {
            id: 0,
            display_name: create.display_name,
            api_key: generate_api_key(),
            description: create.description,
            website: create.website,
            gpg_pubkey_id: create.gpg_pubkey_id,
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/group",
    tag = "group",
    params(ListParams),
    responses(
        (status = 200, description = "Groups visible to the caller", body = ListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    crud::list::<Group>(&state, &headers, params)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/group",
    tag = "group",
    request_body = GroupCreate,
    responses(
        (status = 201, description = "Group created; response carries the api_key once", body = Group),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = crud::create::<Group>(&state, &headers, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/api/group",
    tag = "group",
    params(ListParams),
    request_body = Object,
    responses(
        (status = 200, description = "Every matched group updated", body = NumModified),
        (status = 401, description = "At least one match is not administered by the caller", body = ErrorResponse)
    )
)]
pub async fn update_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
    body: Bytes,
) -> Result<Json<NumModified>, ApiError> {
    crud::update_many::<Group>(&state, &headers, params, body)
        .await
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/api/group/{id}",
    tag = "group",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group", body = Object),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    crud::get::<Group>(&state, &headers, id).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/group/{id}",
    tag = "group",
    params(("id" = i64, Path, description = "Group id")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated group", body = Object),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    crud::update::<Group>(&state, &headers, id, body)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/group/{id}",
    tag = "group",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    crud::delete::<Group>(&state, &headers, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
