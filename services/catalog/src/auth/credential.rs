//! Bearer credential extraction for HTTP requests.
//!
//! Thin glue between axum headers and [`TokenAuthority::verify`]; the
//! verification rules themselves live in `toolshed_authz::token`.
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use toolshed_authz::{CatalogClaims, CredentialError, TokenAuthority};

/// Raw `Authorization` value. A header that is not valid UTF-8 is treated as
/// a present but invalid credential, never as an absent one.
pub fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, CredentialError> {
    match headers.get(AUTHORIZATION) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| CredentialError::Invalid),
    }
}

pub fn verify_required(
    tokens: &TokenAuthority,
    headers: &HeaderMap,
) -> Result<CatalogClaims, CredentialError> {
    tokens.verify_header(authorization_header(headers)?)
}

/// `Ok(None)` when no credential was sent. A credential that was sent must
/// verify.
pub fn verify_optional(
    tokens: &TokenAuthority,
    headers: &HeaderMap,
) -> Result<Option<CatalogClaims>, CredentialError> {
    match authorization_header(headers)? {
        None => Ok(None),
        Some(value) => tokens.verify_header(Some(value)).map(Some),
    }
}
