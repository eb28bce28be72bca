//! Fact gathering for the access rule engine.
//!
//! # Purpose
//! Turns a store transaction plus a request target into the
//! [`TargetFacts`] that [`toolshed_authz::evaluate`] decides on. The rules
//! themselves are pure and live in `toolshed-authz`; this module only knows
//! where the facts are kept.
//!
//! # Key invariants
//! - Facts are read in the same transaction that performs the operation.
//! - Public reads consult nothing beyond the record itself.
//! - Governing installables: the installable itself, the owning installable of
//!   a suite revision, every installable linking a revision or tag.
use toolshed_authz::{
    AccessRequest, Decision, EntityType, Operation, PermissionBits, TargetFacts, UserId,
    Visibility, evaluate,
};

use crate::model::Record;
use crate::store::{CatalogTx, StoreResult};

/// What a request addresses.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A collection-level request. `governing` lists the installables a new
    /// record will belong to.
    Collection { governing: &'a [i64] },
    Instance(&'a Record),
}

impl Target<'_> {
    pub fn instance_id(&self) -> Option<i64> {
        match self {
            Target::Collection { .. } => None,
            Target::Instance(record) => Some(record.id()),
        }
    }
}

pub fn access_request(
    actor: Option<UserId>,
    entity: EntityType,
    operation: Operation,
    target: &Target<'_>,
) -> AccessRequest {
    AccessRequest {
        actor,
        entity,
        instance: target.instance_id(),
        operation,
    }
}

/// Installables whose grants govern `record`.
pub async fn governing_installables(
    tx: &mut dyn CatalogTx,
    record: &Record,
) -> StoreResult<Vec<i64>> {
    match record {
        Record::Installable(installable) => Ok(vec![installable.id]),
        Record::SuiteRevision(suite) => Ok(vec![suite.installable]),
        Record::Revision(_) | Record::Tag(_) => {
            tx.installables_linking(record.entity(), record.id()).await
        }
        Record::User(_) | Record::Group(_) => Ok(Vec::new()),
    }
}

async fn effective_bits(
    tx: &mut dyn CatalogTx,
    actor: UserId,
    installables: &[i64],
) -> StoreResult<Vec<PermissionBits>> {
    let mut bits = Vec::with_capacity(installables.len());
    for installable_id in installables {
        bits.push(tx.grants_for(actor, *installable_id).await?);
    }
    Ok(bits)
}

pub async fn gather_facts(
    tx: &mut dyn CatalogTx,
    actor: Option<UserId>,
    operation: Operation,
    target: &Target<'_>,
) -> StoreResult<TargetFacts> {
    match *target {
        Target::Collection { governing } => {
            let Some(actor) = actor else {
                return Ok(TargetFacts::default());
            };
            Ok(TargetFacts::governed_by(
                effective_bits(tx, actor, governing).await?,
            ))
        }
        Target::Instance(record) => {
            let visibility = record.visibility();
            let facts = TargetFacts::default().with_visibility(visibility);
            let Some(actor) = actor else {
                return Ok(facts);
            };
            if operation.is_read() && visibility == Visibility::Public {
                return Ok(facts);
            }
            if let Record::Group(group) = record {
                let membership = tx.membership(actor, group.id).await?;
                return Ok(TargetFacts {
                    membership: membership.map(|m| m.permissions),
                    ..facts
                });
            }
            let installables = governing_installables(tx, record).await?;
            Ok(TargetFacts {
                governing: effective_bits(tx, actor, &installables).await?,
                ..facts
            })
        }
    }
}

/// Gather facts and evaluate in one step.
pub async fn decide(
    tx: &mut dyn CatalogTx,
    actor: Option<UserId>,
    entity: EntityType,
    operation: Operation,
    target: &Target<'_>,
) -> StoreResult<Decision> {
    let facts = gather_facts(tx, actor, operation, target).await?;
    Ok(evaluate(
        &access_request(actor, entity, operation, target),
        &facts,
    ))
}
