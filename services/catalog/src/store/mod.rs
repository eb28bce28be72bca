//! Catalog persistence seam.
//!
//! # Purpose
//! Defines the [`CatalogStore`] factory and the [`CatalogTx`] unit of work
//! every request runs in. Authorization reads (grants, memberships, links)
//! and the CRUD write go through the same transaction, so a decision can
//! never be made against state that the write does not see.
//!
//! # Key invariants
//! - Nothing is visible to other units of work until [`CatalogTx::commit`].
//! - Dropping a transaction without committing discards every staged change.
//! - Backends classify failures into [`StoreError`]; serialization conflicts
//!   and timeouts are [`StoreError::Transient`] and safe to retry.
use async_trait::async_trait;
use thiserror::Error;
use toolshed_authz::{EntityType, PermissionBits, UserId};

use crate::model::{Grant, Membership, PrincipalKind, Record, User};

pub mod cascade;
pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row locking for list reads inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    /// Lock matched rows until commit; used before bulk updates.
    ForUpdate,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTx>>;
    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// One unit of work against the catalog.
#[async_trait]
pub trait CatalogTx: Send {
    async fn get(&mut self, entity: EntityType, id: i64) -> StoreResult<Option<Record>>;
    /// All records of `entity` ordered by id.
    async fn list(&mut self, entity: EntityType, lock: LockMode) -> StoreResult<Vec<Record>>;
    /// Persist a new record, assigning its id.
    async fn insert(&mut self, record: Record) -> StoreResult<Record>;
    async fn update(&mut self, record: Record) -> StoreResult<Record>;
    /// Remove one record. Dependent rows are handled by [`cascade::delete`].
    async fn remove(&mut self, entity: EntityType, id: i64) -> StoreResult<()>;
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;
    /// Installables whose `tag_ids` or `revision_ids` contain `id`.
    async fn installables_linking(&mut self, entity: EntityType, id: i64)
    -> StoreResult<Vec<i64>>;

    async fn grants_on(&mut self, installable_id: i64) -> StoreResult<Vec<Grant>>;
    /// Create or replace the grant of `principal_id` on `installable_id`.
    async fn upsert_grant(
        &mut self,
        kind: PrincipalKind,
        principal_id: i64,
        installable_id: i64,
        permissions: PermissionBits,
    ) -> StoreResult<Grant>;
    async fn delete_grant(
        &mut self,
        kind: PrincipalKind,
        installable_id: i64,
        grant_id: i64,
    ) -> StoreResult<()>;
    async fn delete_grants_of_principal(
        &mut self,
        kind: PrincipalKind,
        principal_id: i64,
    ) -> StoreResult<u64>;
    async fn delete_grants_on(&mut self, installable_id: i64) -> StoreResult<u64>;
    /// OR of the user's direct grant and the grants of every group the user
    /// belongs to.
    async fn grants_for(&mut self, user: UserId, installable_id: i64)
    -> StoreResult<PermissionBits>;

    async fn memberships_of(&mut self, group_id: i64) -> StoreResult<Vec<Membership>>;
    async fn membership(&mut self, user: UserId, group_id: i64)
    -> StoreResult<Option<Membership>>;
    async fn upsert_membership(&mut self, membership: Membership) -> StoreResult<Membership>;
    async fn delete_membership(&mut self, group_id: i64, user_id: i64) -> StoreResult<()>;
    async fn delete_memberships_of(&mut self, kind: PrincipalKind, id: i64) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
