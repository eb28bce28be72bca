//! Grant Store: direct grants on installables and group memberships.
//!
//! # Purpose
//! Wraps the grant and membership rows of a [`CatalogTx`] with the checks the
//! HTTP layer needs (principals and installables must exist, a grant carries
//! at least one bit) and the lifecycle grants handed out on creation.
//!
//! # Key invariants
//! - At most one grant per (principal, installable) and one membership per
//!   (user, group); writes replace.
//! - Changes become visible to later requests only, once the unit of work
//!   commits.
use thiserror::Error;
use toolshed_authz::{EntityType, PermissionBits, UserId};

use crate::model::{Grant, GrantRequest, Membership, PrincipalKind, ValidationError};
use crate::store::{CatalogTx, StoreError, StoreResult};

#[derive(Debug, Error)]
pub enum GrantError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct GrantStore<'a> {
    tx: &'a mut dyn CatalogTx,
}

impl<'a> GrantStore<'a> {
    pub fn new(tx: &'a mut dyn CatalogTx) -> Self {
        GrantStore { tx }
    }

    /// OR of the user's direct grant and every group-derived grant.
    pub async fn grants_for(
        &mut self,
        user: UserId,
        installable_id: i64,
    ) -> StoreResult<PermissionBits> {
        self.tx.grants_for(user, installable_id).await
    }

    pub async fn list(&mut self, installable_id: i64) -> StoreResult<Vec<Grant>> {
        self.tx.grants_on(installable_id).await
    }

    pub async fn grant(
        &mut self,
        installable_id: i64,
        request: &GrantRequest,
    ) -> Result<Grant, GrantError> {
        require_bits(request.permissions)?;
        let entity = match request.kind {
            PrincipalKind::User => EntityType::User,
            PrincipalKind::Group => EntityType::Group,
        };
        self.require_exists(entity, request.principal_id).await?;
        Ok(self
            .tx
            .upsert_grant(
                request.kind,
                request.principal_id,
                installable_id,
                request.permissions,
            )
            .await?)
    }

    pub async fn revoke(
        &mut self,
        kind: PrincipalKind,
        installable_id: i64,
        grant_id: i64,
    ) -> StoreResult<()> {
        self.tx.delete_grant(kind, installable_id, grant_id).await
    }

    pub async fn members(&mut self, group_id: i64) -> StoreResult<Vec<Membership>> {
        self.tx.memberships_of(group_id).await
    }

    pub async fn set_membership(
        &mut self,
        group_id: i64,
        user_id: i64,
        permissions: PermissionBits,
    ) -> Result<Membership, GrantError> {
        self.require_exists(EntityType::User, user_id).await?;
        Ok(self
            .tx
            .upsert_membership(Membership {
                user_id,
                group_id,
                permissions,
            })
            .await?)
    }

    pub async fn remove_membership(&mut self, group_id: i64, user_id: i64) -> StoreResult<()> {
        self.tx.delete_membership(group_id, user_id).await
    }

    /// The creator of an installable owns it outright.
    pub async fn on_installable_created(
        &mut self,
        creator: UserId,
        installable_id: i64,
    ) -> StoreResult<Grant> {
        self.tx
            .upsert_grant(
                PrincipalKind::User,
                creator.get(),
                installable_id,
                PermissionBits::ALL,
            )
            .await
    }

    /// The creator of a group becomes its first administrator.
    pub async fn on_group_created(
        &mut self,
        creator: UserId,
        group_id: i64,
    ) -> StoreResult<Membership> {
        self.tx
            .upsert_membership(Membership {
                user_id: creator.get(),
                group_id,
                permissions: PermissionBits::ALL,
            })
            .await
    }

    async fn require_exists(&mut self, entity: EntityType, id: i64) -> Result<(), GrantError> {
        match self.tx.get(entity, id).await? {
            Some(_) => Ok(()),
            None => Err(GrantError::Invalid(ValidationError::new(format!(
                "{} {id} does not exist",
                entity.as_str()
            )))),
        }
    }
}

fn require_bits(bits: PermissionBits) -> Result<(), ValidationError> {
    if bits.is_empty() {
        return Err(ValidationError::new(
            "permissions must include read, write or admin",
        ));
    }
    Ok(())
}
