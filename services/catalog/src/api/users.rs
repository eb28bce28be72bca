//! User endpoints.
//!
//! Users register themselves anonymously and may only modify or delete their
//! own record. Registration answers once with the generated `api_key`;
//! every later read omits `email` and `api_key`.
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::api::crud::{self, NewRecord, Resource};
use crate::api::error::ApiError;
use crate::api::types::{ErrorResponse, ListParams, ListResponse};
use crate::app::AppState;
use crate::auth::keys::generate_api_key;
use crate::model::{User, UserCreate};

impl Resource for User {
    type Create = UserCreate;

    const FIELDS: &'static [&'static str] = &["id", "display_name", "gpg_pubkey_id"];
    const PATCHABLE: &'static [&'static str] = &["display_name", "email", "gpg_pubkey_id"];
    const REDACTED: &'static [&'static str] = &["email", "api_key"];
    const BULK_UPDATE: bool = false;

    fn from_create(create: UserCreate) -> NewRecord<Self> {
        NewRecord::unlinked(User {
            id: 0,
            display_name: create.display_name,
            email: create.email,
            api_key: generate_api_key(),
            gpg_pubkey_id: create.gpg_pubkey_id,
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/user",
    tag = "user",
    params(ListParams),
    responses(
        (status = 200, description = "Users visible to the caller", body = ListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    crud::list::<User>(&state, &headers, params)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/user",
    tag = "user",
    request_body = UserCreate,
    responses(
        (status = 201, description = "Registered; response carries the api_key once", body = User),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = crud::create::<User>(&state, &headers, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/user/{id}",
    tag = "user",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = Object),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    crud::get::<User>(&state, &headers, id).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/user/{id}",
    tag = "user",
    params(("id" = i64, Path, description = "User id")),
    request_body = Object,
    responses(
        (status = 200, description = "Updated user", body = Object),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    crud::update::<User>(&state, &headers, id, body)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/user/{id}",
    tag = "user",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    crud::delete::<User>(&state, &headers, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
