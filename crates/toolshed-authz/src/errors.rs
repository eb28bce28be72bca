use thiserror::Error;

/// Failures raised while building authorization primitives or minting tokens.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),
    #[error("token key set has no keys")]
    EmptyKeySet,
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

pub type AuthzResult<T> = Result<T, AuthzError>;

/// Why a bearer credential could not be turned into claims.
///
/// Every variant collapses to the same unauthenticated response at the HTTP
/// boundary; the distinction exists for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("missing bearer credential")]
    Missing,
    #[error("malformed or unverifiable credential")]
    Invalid,
    #[error("credential expired or not yet valid")]
    Expired,
}

impl CredentialError {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialError::Missing => "missing",
            CredentialError::Invalid => "invalid",
            CredentialError::Expired => "expired",
        }
    }
}
