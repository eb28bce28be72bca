//! Token issuance.
//!
//! # Purpose
//! Exchanges a user's email and API key for a short-lived bearer token
//! signed with the service's current key.
//!
//! # Security considerations
//! - API keys are compared in constant time, and an unknown email still
//!   performs a comparison.
//! - Every failure answers with the same 401 body.
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use subtle::ConstantTimeEq;
use toolshed_authz::{TOKEN_TYPE, UserId};

use crate::api::crud::unit_of_work;
use crate::api::error::{ApiError, api_internal, api_unauthorized};
use crate::api::types::{ErrorResponse, TokenRequest, TokenResponse};
use crate::app::AppState;
use crate::model::API_KEY_LEN;

static UNKNOWN_USER_KEY: [u8; API_KEY_LEN] = [0u8; API_KEY_LEN];

#[utoipa::path(
    post,
    path = "/api/auth/token",
    tag = "auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Bearer token", body = TokenResponse),
        (status = 401, description = "Unknown email or wrong api_key", body = ErrorResponse)
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TokenResponse>, ApiError> {
    let request: TokenRequest = serde_json::from_slice(&body)?;
    let user = unit_of_work(&state, async {
        let mut tx = state.store.begin().await?;
        let user = tx.find_user_by_email(&request.email).await?;
        tx.commit().await?;
        Ok(user)
    })
    .await?;

    let stored_key = user
        .as_ref()
        .map_or(&UNKNOWN_USER_KEY[..], |user| user.api_key.as_bytes());
    let key_matches: bool = stored_key.ct_eq(request.api_key.as_bytes()).into();
    let Some(user) = user.filter(|_| key_matches) else {
        tracing::info!(
            target: "catalog::audit",
            outcome = "token_denied",
            "token request rejected"
        );
        return Err(api_unauthorized());
    };

    let tokens = state.pipeline.tokens();
    let access_token = tokens
        .mint(UserId::new(user.id))
        .map_err(|err| api_internal("failed to mint token", &err))?;
    tracing::info!(
        target: "catalog::audit",
        actor = user.id,
        outcome = "token_issued",
        "token issued"
    );
    Ok(Json(TokenResponse {
        access_token,
        token_type: TOKEN_TYPE.to_string(),
        expires_in: tokens.ttl().as_secs(),
    }))
}
