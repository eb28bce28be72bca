use thiserror::Error;
use toolshed_authz::{CredentialError, DenyReason, UserId};

use crate::store::StoreError;

/// Why the interception pipeline aborted a request.
///
/// Every variant except [`AuthError::Store`] surfaces to clients as the same
/// 401 body; the detail stays in the audit log.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] CredentialError),
    #[error("actor {0} does not exist")]
    ActorNotFound(UserId),
    #[error("not authorized: {0}")]
    NotAuthorized(DenyReason),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Store(err) if err.is_transient())
    }

    /// Label used for audit events and the decisions counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(_) => "unauthenticated",
            AuthError::ActorNotFound(_) => "actor_not_found",
            AuthError::NotAuthorized(_) => "deny",
            AuthError::Store(err) if err.is_transient() => "unavailable",
            AuthError::Store(_) => "error",
        }
    }
}
