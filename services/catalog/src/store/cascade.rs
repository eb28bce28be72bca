//! Delete cascades shared by every backend.
//!
//! Deleting a user or group drops its memberships and direct grants. Deleting
//! an installable drops every grant on it and the suite revisions it owns.
//! Deleting a revision or tag unlinks it everywhere it is referenced. All of
//! it runs inside the caller's unit of work.
use toolshed_authz::EntityType;

use super::{CatalogTx, LockMode, StoreError, StoreResult};
use crate::model::{PrincipalKind, Record};

pub async fn delete(tx: &mut dyn CatalogTx, entity: EntityType, id: i64) -> StoreResult<()> {
    if tx.get(entity, id).await?.is_none() {
        return Err(StoreError::NotFound(entity.as_str().to_string()));
    }
    match entity {
        EntityType::User => {
            tx.delete_memberships_of(PrincipalKind::User, id).await?;
            tx.delete_grants_of_principal(PrincipalKind::User, id).await?;
        }
        EntityType::Group => {
            tx.delete_memberships_of(PrincipalKind::Group, id).await?;
            tx.delete_grants_of_principal(PrincipalKind::Group, id).await?;
        }
        EntityType::Installable => {
            tx.delete_grants_on(id).await?;
            for record in tx.list(EntityType::SuiteRevision, LockMode::ForUpdate).await? {
                if let Record::SuiteRevision(suite) = &record
                    && suite.installable == id
                {
                    tx.remove(EntityType::SuiteRevision, suite.id).await?;
                }
            }
        }
        EntityType::Revision => unlink_revision(tx, id).await?,
        EntityType::Tag => {
            for installable_id in tx.installables_linking(EntityType::Tag, id).await? {
                if let Some(Record::Installable(mut installable)) =
                    tx.get(EntityType::Installable, installable_id).await?
                {
                    installable.tag_ids.retain(|tag| *tag != id);
                    tx.update(Record::Installable(installable)).await?;
                }
            }
        }
        EntityType::SuiteRevision => {}
    }
    tx.remove(entity, id).await
}

async fn unlink_revision(tx: &mut dyn CatalogTx, id: i64) -> StoreResult<()> {
    for installable_id in tx.installables_linking(EntityType::Revision, id).await? {
        if let Some(Record::Installable(mut installable)) =
            tx.get(EntityType::Installable, installable_id).await?
        {
            installable.revision_ids.retain(|revision| *revision != id);
            tx.update(Record::Installable(installable)).await?;
        }
    }
    for record in tx.list(EntityType::SuiteRevision, LockMode::ForUpdate).await? {
        if let Record::SuiteRevision(mut suite) = record
            && suite.contained_revision_ids.contains(&id)
        {
            suite.contained_revision_ids.retain(|revision| *revision != id);
            tx.update(Record::SuiteRevision(suite)).await?;
        }
    }
    for record in tx.list(EntityType::Revision, LockMode::ForUpdate).await? {
        if let Record::Revision(mut revision) = record
            && revision.replacement_revision == Some(id)
        {
            revision.replacement_revision = None;
            tx.update(Record::Revision(revision)).await?;
        }
    }
    Ok(())
}
