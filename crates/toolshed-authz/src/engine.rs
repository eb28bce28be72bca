//! Pure access rule evaluation.
//!
//! # Purpose
//! Decides allow/deny for one `(actor, entity type, instance, operation)`
//! request given the facts the caller gathered about the target: visibility,
//! the actor's effective bits on every governing installable and, for
//! groups, the actor's membership bits.
//!
//! # How it fits
//! The catalog service collects [`TargetFacts`] inside the request
//! transaction and calls [`evaluate`]. The engine never touches storage, so
//! every rule is unit-testable here.
//!
//! # Key invariants
//! - Rules are checked in a fixed order and the first applicable rule decides.
//! - Anything not explicitly allowed is denied.
//! - A bulk update addressed to the collection is never allowed as a whole;
//!   callers re-evaluate each matched instance.
//! - When several installables govern one instance, every one of them must
//!   grant the required class.
//!
//! # Examples
//! ```rust
//! use toolshed_authz::{
//!     AccessRequest, EntityType, Operation, PermissionBits, TargetFacts, UserId, evaluate,
//! };
//!
//! let request = AccessRequest {
//!     actor: Some(UserId::new(7)),
//!     entity: EntityType::Installable,
//!     instance: Some(3),
//!     operation: Operation::UpdateSingle,
//! };
//! let facts = TargetFacts::governed_by([PermissionBits::WRITE]);
//! assert!(evaluate(&request, &facts).is_allowed());
//! ```
use serde::Serialize;

use crate::{EntityType, Operation, OperationClass, PermissionBits, UserId, Visibility};

/// One authorization question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest {
    /// `None` for anonymous callers.
    pub actor: Option<UserId>,
    pub entity: EntityType,
    /// `None` for collection-level requests.
    pub instance: Option<i64>,
    pub operation: Operation,
}

/// Facts about the target, gathered by the caller in the same transaction
/// that will perform the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFacts {
    pub visibility: Visibility,
    /// Actor's effective bits on each installable governing the target.
    pub governing: Vec<PermissionBits>,
    /// Actor's membership bits when the target is a group.
    pub membership: Option<PermissionBits>,
}

impl TargetFacts {
    pub fn governed_by(bits: impl IntoIterator<Item = PermissionBits>) -> Self {
        TargetFacts {
            governing: bits.into_iter().collect(),
            ..TargetFacts::default()
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn member_with(bits: PermissionBits) -> Self {
        TargetFacts {
            membership: Some(bits),
            ..TargetFacts::default()
        }
    }

    fn every_governing_covers(&self, class: OperationClass) -> bool {
        !self.governing.is_empty() && self.governing.iter().all(|bits| bits.covers(class))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The rule needs an authenticated actor.
    Unauthenticated,
    /// Authenticated callers cannot register another user.
    AlreadyRegistered,
    /// Self-only rule: the instance is not the actor's own record.
    NotSelf,
    /// Nothing governs the instance, so no grant can cover it.
    NoGoverningInstallable,
    /// A governing grant or the membership does not cover the class.
    InsufficientGrant,
    /// Collection-level bulk requests are decided per instance.
    BulkRequiresInstance,
    /// Private resource and no read grant.
    Private,
    /// No rule applied.
    NoMatchingRule,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::AlreadyRegistered => "already_registered",
            DenyReason::NotSelf => "not_self",
            DenyReason::NoGoverningInstallable => "no_governing_installable",
            DenyReason::InsufficientGrant => "insufficient_grant",
            DenyReason::BulkRequiresInstance => "bulk_requires_instance",
            DenyReason::Private => "private",
            DenyReason::NoMatchingRule => "no_matching_rule",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny(_) => "deny",
        }
    }

    fn require(condition: bool, reason: DenyReason) -> Decision {
        if condition {
            Decision::Allow
        } else {
            Decision::Deny(reason)
        }
    }
}

/// Evaluate the access rules for `request` against `facts`.
pub fn evaluate(request: &AccessRequest, facts: &TargetFacts) -> Decision {
    if request.operation.is_read() {
        return public_read(request, facts);
    }
    match request.entity {
        EntityType::User => self_only(request),
        EntityType::Group => group_membership(request, facts),
        entity if entity.is_installable_governed() => ownership(request, facts),
        _ => Decision::Deny(DenyReason::NoMatchingRule),
    }
}

fn self_only(request: &AccessRequest) -> Decision {
    match (request.operation, request.actor) {
        (Operation::Create, None) => Decision::Allow,
        (Operation::Create, Some(_)) => Decision::Deny(DenyReason::AlreadyRegistered),
        (_, None) => Decision::Deny(DenyReason::Unauthenticated),
        (_, Some(actor)) => Decision::require(request.instance == Some(actor.get()), DenyReason::NotSelf),
    }
}

fn group_membership(request: &AccessRequest, facts: &TargetFacts) -> Decision {
    if request.actor.is_none() {
        return Decision::Deny(DenyReason::Unauthenticated);
    }
    match (request.operation, request.instance) {
        (Operation::Create, _) => Decision::Allow,
        (Operation::UpdateMany, None) => Decision::Deny(DenyReason::BulkRequiresInstance),
        (_, None) => Decision::Deny(DenyReason::NoMatchingRule),
        (operation, Some(_)) => Decision::require(
            facts
                .membership
                .is_some_and(|bits| bits.covers(operation.class())),
            DenyReason::InsufficientGrant,
        ),
    }
}

fn ownership(request: &AccessRequest, facts: &TargetFacts) -> Decision {
    if request.actor.is_none() {
        return Decision::Deny(DenyReason::Unauthenticated);
    }
    let operation = request.operation;
    if operation == Operation::UpdateMany && request.instance.is_none() {
        return Decision::Deny(DenyReason::BulkRequiresInstance);
    }
    if facts.governing.is_empty() {
        let free_create = operation == Operation::Create
            && matches!(request.entity, EntityType::Installable | EntityType::Tag);
        return Decision::require(free_create, DenyReason::NoGoverningInstallable);
    }
    Decision::require(
        facts.every_governing_covers(operation.class()),
        DenyReason::InsufficientGrant,
    )
}

fn public_read(request: &AccessRequest, facts: &TargetFacts) -> Decision {
    match facts.visibility {
        Visibility::Public => Decision::Allow,
        Visibility::Private if request.actor.is_none() => Decision::Deny(DenyReason::Private),
        Visibility::Private => Decision::require(
            facts.every_governing_covers(OperationClass::Read),
            DenyReason::Private,
        ),
    }
}
