//! In-memory implementation of the catalog store.
//!
//! # Purpose
//! Keeps the whole catalog in process memory. Used for local development, for
//! tests and whenever no durable backend is configured.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Serializable**: a unit of work holds the store mutex from `begin` until
//!   it is committed or dropped, so units of work never interleave.
//! - Changes are staged on a private copy of the state; `commit` swaps the copy
//!   in and dropping the transaction discards it.
//!
//! # Performance characteristics
//! - Every unit of work clones the state once. That is fine for development
//!   sized catalogs and keeps rollback trivial.
//! - Link lookups scan installables linearly.
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use toolshed_authz::{EntityType, PermissionBits, UserId};

use super::{CatalogStore, CatalogTx, LockMode, StoreError, StoreResult};
use crate::model::{Grant, Membership, PrincipalKind, Record, User};

#[derive(Debug, Clone, Default)]
struct CatalogState {
    records: HashMap<EntityType, BTreeMap<i64, Record>>,
    next_record_id: i64,
    grants: BTreeMap<i64, Grant>,
    next_grant_id: i64,
    // Keyed by (group_id, user_id).
    memberships: BTreeMap<(i64, i64), Membership>,
}

impl CatalogState {
    fn table(&self, entity: EntityType) -> impl Iterator<Item = &Record> {
        self.records
            .get(&entity)
            .into_iter()
            .flat_map(|table| table.values())
    }

    fn check_unique(&self, record: &Record) -> StoreResult<()> {
        let clash = |other: &Record| -> Option<&'static str> {
            if other.id() == record.id() {
                return None;
            }
            match (record, other) {
                (Record::User(new), Record::User(existing)) => {
                    if new.email == existing.email {
                        Some("email already registered")
                    } else if new.api_key == existing.api_key {
                        Some("api_key already in use")
                    } else {
                        None
                    }
                }
                (Record::Group(new), Record::Group(existing)) if new.api_key == existing.api_key => {
                    Some("api_key already in use")
                }
                _ => None,
            }
        };
        match self.table(record.entity()).find_map(clash) {
            Some(reason) => Err(StoreError::Conflict(reason.to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<CatalogState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx { guard, staged }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<CatalogState>,
    staged: CatalogState,
}

#[async_trait]
impl CatalogTx for InMemoryTx {
    async fn get(&mut self, entity: EntityType, id: i64) -> StoreResult<Option<Record>> {
        Ok(self
            .staged
            .records
            .get(&entity)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    async fn list(&mut self, entity: EntityType, _lock: LockMode) -> StoreResult<Vec<Record>> {
        Ok(self.staged.table(entity).cloned().collect())
    }

    async fn insert(&mut self, mut record: Record) -> StoreResult<Record> {
        self.staged.next_record_id += 1;
        record.set_id(self.staged.next_record_id);
        self.staged.check_unique(&record)?;
        self.staged
            .records
            .entry(record.entity())
            .or_default()
            .insert(record.id(), record.clone());
        Ok(record)
    }

    async fn update(&mut self, record: Record) -> StoreResult<Record> {
        self.staged.check_unique(&record)?;
        let slot = self
            .staged
            .records
            .get_mut(&record.entity())
            .and_then(|table| table.get_mut(&record.id()))
            .ok_or_else(|| StoreError::NotFound(record.entity().as_str().to_string()))?;
        *slot = record.clone();
        Ok(record)
    }

    async fn remove(&mut self, entity: EntityType, id: i64) -> StoreResult<()> {
        self.staged
            .records
            .get_mut(&entity)
            .and_then(|table| table.remove(&id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(entity.as_str().to_string()))
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .staged
            .table(EntityType::User)
            .find_map(|record| match record {
                Record::User(user) if user.email == email => Some(user.clone()),
                _ => None,
            }))
    }

    async fn installables_linking(
        &mut self,
        entity: EntityType,
        id: i64,
    ) -> StoreResult<Vec<i64>> {
        Ok(self
            .staged
            .table(EntityType::Installable)
            .filter_map(|record| match record {
                Record::Installable(installable) => {
                    let links = match entity {
                        EntityType::Tag => &installable.tag_ids,
                        EntityType::Revision => &installable.revision_ids,
                        _ => return None,
                    };
                    links.contains(&id).then_some(installable.id)
                }
                _ => None,
            })
            .collect())
    }

    async fn grants_on(&mut self, installable_id: i64) -> StoreResult<Vec<Grant>> {
        Ok(self
            .staged
            .grants
            .values()
            .filter(|grant| grant.installable_id == installable_id)
            .cloned()
            .collect())
    }

    async fn upsert_grant(
        &mut self,
        kind: PrincipalKind,
        principal_id: i64,
        installable_id: i64,
        permissions: PermissionBits,
    ) -> StoreResult<Grant> {
        if let Some(existing) = self.staged.grants.values_mut().find(|grant| {
            grant.kind == kind
                && grant.principal_id == principal_id
                && grant.installable_id == installable_id
        }) {
            existing.permissions = permissions;
            return Ok(existing.clone());
        }
        self.staged.next_grant_id += 1;
        let grant = Grant {
            id: self.staged.next_grant_id,
            kind,
            principal_id,
            installable_id,
            permissions,
        };
        self.staged.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn delete_grant(
        &mut self,
        kind: PrincipalKind,
        installable_id: i64,
        grant_id: i64,
    ) -> StoreResult<()> {
        match self.staged.grants.get(&grant_id) {
            Some(grant) if grant.kind == kind && grant.installable_id == installable_id => {
                self.staged.grants.remove(&grant_id);
                Ok(())
            }
            _ => Err(StoreError::NotFound("grant".to_string())),
        }
    }

    async fn delete_grants_of_principal(
        &mut self,
        kind: PrincipalKind,
        principal_id: i64,
    ) -> StoreResult<u64> {
        let before = self.staged.grants.len();
        self.staged
            .grants
            .retain(|_, grant| !(grant.kind == kind && grant.principal_id == principal_id));
        Ok((before - self.staged.grants.len()) as u64)
    }

    async fn delete_grants_on(&mut self, installable_id: i64) -> StoreResult<u64> {
        let before = self.staged.grants.len();
        self.staged
            .grants
            .retain(|_, grant| grant.installable_id != installable_id);
        Ok((before - self.staged.grants.len()) as u64)
    }

    async fn grants_for(
        &mut self,
        user: UserId,
        installable_id: i64,
    ) -> StoreResult<PermissionBits> {
        let state = &self.staged;
        let groups: Vec<i64> = state
            .memberships
            .values()
            .filter(|membership| membership.user_id == user.get())
            .map(|membership| membership.group_id)
            .collect();
        Ok(state
            .grants
            .values()
            .filter(|grant| grant.installable_id == installable_id)
            .filter(|grant| match grant.kind {
                PrincipalKind::User => grant.principal_id == user.get(),
                PrincipalKind::Group => groups.contains(&grant.principal_id),
            })
            .map(|grant| grant.permissions)
            .collect())
    }

    async fn memberships_of(&mut self, group_id: i64) -> StoreResult<Vec<Membership>> {
        Ok(self
            .staged
            .memberships
            .range((group_id, i64::MIN)..=(group_id, i64::MAX))
            .map(|(_, membership)| membership.clone())
            .collect())
    }

    async fn membership(
        &mut self,
        user: UserId,
        group_id: i64,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .staged
            .memberships
            .get(&(group_id, user.get()))
            .cloned())
    }

    async fn upsert_membership(&mut self, membership: Membership) -> StoreResult<Membership> {
        self.staged.memberships.insert(
            (membership.group_id, membership.user_id),
            membership.clone(),
        );
        Ok(membership)
    }

    async fn delete_membership(&mut self, group_id: i64, user_id: i64) -> StoreResult<()> {
        self.staged
            .memberships
            .remove(&(group_id, user_id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("membership".to_string()))
    }

    async fn delete_memberships_of(&mut self, kind: PrincipalKind, id: i64) -> StoreResult<u64> {
        let before = self.staged.memberships.len();
        self.staged.memberships.retain(|(group_id, user_id), _| match kind {
            PrincipalKind::User => *user_id != id,
            PrincipalKind::Group => *group_id != id,
        });
        Ok((before - self.staged.memberships.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
