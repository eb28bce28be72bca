//! Identity resolution: verified claims to a concrete user.
use toolshed_authz::{CatalogClaims, CredentialError, EntityType, UserId};

use crate::auth::AuthError;
use crate::model::{Record, User};
use crate::store::CatalogTx;

/// The authenticated caller of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Actor {
            id: UserId::new(user.id),
            display_name: user.display_name.clone(),
        }
    }
}

/// Load the user named by `claims.sub` inside the request transaction.
///
/// # Errors
/// - [`AuthError::Unauthenticated`] if the subject is not a user id.
/// - [`AuthError::ActorNotFound`] if the user has since been deleted.
/// - [`AuthError::Store`] on store failure.
pub async fn resolve(tx: &mut dyn CatalogTx, claims: &CatalogClaims) -> Result<Actor, AuthError> {
    let user_id = claims
        .user_id()
        .ok_or(AuthError::Unauthenticated(CredentialError::Invalid))?;
    match tx.get(EntityType::User, user_id.get()).await? {
        Some(Record::User(user)) => Ok(Actor::from_user(&user)),
        _ => Err(AuthError::ActorNotFound(user_id)),
    }
}
