//! Catalog data model.
//!
//! # Purpose
//! Defines the catalog entities (users, groups, installables, tags, revisions,
//! suite revisions), the grant and membership rows, and the [`Record`] enum
//! the store persists.
//!
//! # Key invariants
//! - Every entity validates its own field limits; stores never persist a
//!   record that failed [`Entity::validate`].
//! - `id` is assigned by the store and never accepted from clients.
mod grant;
mod group;
mod installable;
mod record;
mod revision;
mod suite_revision;
mod tag;
mod user;

pub use grant::{Grant, GrantRequest, Membership, MembershipRequest, PrincipalKind};
pub use group::{Group, GroupCreate};
pub use installable::{Installable, InstallableCreate, RepositoryType};
pub use record::Record;
pub use revision::{Revision, RevisionCreate};
pub use suite_revision::{SuiteRevision, SuiteRevisionCreate};
pub use tag::{Tag, TagCreate};
pub use user::{User, UserCreate};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use toolshed_authz::{EntityType, Visibility};

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_GPG_KEY_ID_LEN: usize = 16;
pub const MAX_VERSION_LEN: usize = 12;
pub const API_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError(message.into())
    }
}

/// Behavior shared by every stored catalog entity.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ENTITY: EntityType;

    fn id(&self) -> i64;

    fn validate(&self) -> Result<(), ValidationError>;

    /// Canonicalize derived state before validation (dedup link lists and so on).
    fn normalize(&mut self) {}

    /// Other records this one points at. They must exist when it is written.
    fn references(&self) -> Vec<(EntityType, i64)> {
        Vec::new()
    }

    fn visibility(&self) -> Visibility {
        Visibility::Public
    }

    fn into_record(self) -> Record;

    fn from_record(record: Record) -> Option<Self>;
}

pub(crate) fn require_text(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(format!("{field} is required")));
    }
    limit_text(field, value, max)
}

pub(crate) fn limit_text(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub(crate) fn limit_optional(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(value) => limit_text(field, value, max),
        None => Ok(()),
    }
}

pub(crate) fn dedup_ids(ids: &mut Vec<i64>) {
    ids.sort_unstable();
    ids.dedup();
}
