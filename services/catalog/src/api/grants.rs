//! Grant and membership management endpoints.
//!
//! Every route runs the `manage_grants` chain: installable grants need the
//! admin bit on the installable, memberships need the admin bit in the
//! group.
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use toolshed_authz::{EntityType, Operation};

use crate::api::crud::{load, unit_of_work};
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::ErrorResponse;
use crate::app::AppState;
use crate::auth::engine::Target;
use crate::auth::grants::GrantStore;
use crate::model::{Grant, GrantRequest, Membership, MembershipRequest, PrincipalKind};
use crate::store::CatalogTx;

async fn admit_manager(
    state: &AppState,
    headers: &HeaderMap,
    tx: &mut dyn CatalogTx,
    entity: EntityType,
    id: i64,
) -> Result<(), ApiError> {
    let mut admission = state
        .pipeline
        .admit(headers, tx, entity, Operation::ManageGrants)
        .await?;
    let record = load(tx, entity, id).await?;
    admission.authorize(tx, Target::Instance(&record)).await?;
    admission.proceed();
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/installable/{id}/grants",
    tag = "grants",
    params(("id" = i64, Path, description = "Installable id")),
    responses(
        (status = 200, description = "User and group grants on the installable", body = [Grant]),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_grants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Grant>>, ApiError> {
    unit_of_work(&state, async {
        let mut tx = state.store.begin().await?;
        admit_manager(&state, &headers, tx.as_mut(), EntityType::Installable, id).await?;
        let grants = GrantStore::new(tx.as_mut()).list(id).await?;
        tx.commit().await?;
        Ok(Json(grants))
    })
    .await
}

#[utoipa::path(
    post,
    path = "/api/installable/{id}/grants",
    tag = "grants",
    params(("id" = i64, Path, description = "Installable id")),
    request_body = GrantRequest,
    responses(
        (status = 201, description = "Grant created or replaced", body = Grant),
        (status = 400, description = "Unknown principal or empty permissions", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn add_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<(StatusCode, Json<Grant>), ApiError> {
    let request: GrantRequest = serde_json::from_slice(&body)?;
    unit_of_work(&state, async {
        let mut tx = state.store.begin().await?;
        admit_manager(&state, &headers, tx.as_mut(), EntityType::Installable, id).await?;
        let grant = GrantStore::new(tx.as_mut()).grant(id, &request).await?;
        tx.commit().await?;
        tracing::info!(
            installable_id = id,
            kind = grant.kind.as_str(),
            principal_id = grant.principal_id,
            permissions = %grant.permissions,
            "grant stored"
        );
        Ok((StatusCode::CREATED, Json(grant)))
    })
    .await
}

#[utoipa::path(
    delete,
    path = "/api/installable/{id}/grants/{kind}/{grant_id}",
    tag = "grants",
    params(
        ("id" = i64, Path, description = "Installable id"),
        ("kind" = String, Path, description = "user or group"),
        ("grant_id" = i64, Path, description = "Grant id")
    ),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "No such grant", body = ErrorResponse)
    )
)]
pub async fn revoke_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, kind, grant_id)): Path<(i64, String, i64)>,
) -> Result<StatusCode, ApiError> {
    let kind: PrincipalKind = kind.parse().map_err(|err: String| api_validation_error(&err))?;
    unit_of_work(&state, async {
        let mut tx = state.store.begin().await?;
        admit_manager(&state, &headers, tx.as_mut(), EntityType::Installable, id).await?;
        GrantStore::new(tx.as_mut())
            .revoke(kind, id, grant_id)
            .await?;
        tx.commit().await?;
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/group/{id}/members",
    tag = "grants",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group memberships", body = [Membership]),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Membership>>, ApiError> {
    unit_of_work(&state, async {
        let mut tx = state.store.begin().await?;
        admit_manager(&state, &headers, tx.as_mut(), EntityType::Group, id).await?;
        let members = GrantStore::new(tx.as_mut()).members(id).await?;
        tx.commit().await?;
        Ok(Json(members))
    })
    .await
}

#[utoipa::path(
    put,
    path = "/api/group/{id}/members/{user_id}",
    tag = "grants",
    params(
        ("id" = i64, Path, description = "Group id"),
        ("user_id" = i64, Path, description = "User id")
    ),
    request_body = MembershipRequest,
    responses(
        (status = 200, description = "Membership created or replaced", body = Membership),
        (status = 400, description = "Unknown user", body = ErrorResponse),
        (status = 401, description = "Not authorized", body = ErrorResponse)
    )
)]
pub async fn put_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(i64, i64)>,
    body: Bytes,
) -> Result<Json<Membership>, ApiError> {
    let request: MembershipRequest = serde_json::from_slice(&body)?;
    unit_of_work(&state, async {
        let mut tx = state.store.begin().await?;
        admit_manager(&state, &headers, tx.as_mut(), EntityType::Group, id).await?;
        let membership = GrantStore::new(tx.as_mut())
            .set_membership(id, user_id, request.permissions)
            .await?;
        tx.commit().await?;
        Ok(Json(membership))
    })
    .await
}

#[utoipa::path(
    delete,
    path = "/api/group/{id}/members/{user_id}",
    tag = "grants",
    params(
        ("id" = i64, Path, description = "Group id"),
        ("user_id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "Membership removed"),
        (status = 401, description = "Not authorized", body = ErrorResponse),
        (status = 404, description = "No such membership", body = ErrorResponse)
    )
)]
pub async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    unit_of_work(&state, async {
        let mut tx = state.store.begin().await?;
        admit_manager(&state, &headers, tx.as_mut(), EntityType::Group, id).await?;
        GrantStore::new(tx.as_mut())
            .remove_membership(id, user_id)
            .await?;
        tx.commit().await?;
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
