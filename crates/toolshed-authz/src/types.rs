//! Identifiers and entity kinds the rule engine reasons about.
//!
//! # Purpose
//! Keeps entity kinds and actor identifiers strongly typed so the engine and
//! the service never compare a user id with an installable id by accident.
//!
//! # Key invariants
//! - `EntityType::as_str` is also the collection segment under `/api/`.
//! - Only users act; groups hold grants but never authenticate.
use serde::{Deserialize, Serialize};

use crate::AuthzError;

/// Identifier of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(value: i64) -> Self {
        UserId(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse().map(UserId)
    }
}

/// Catalog entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Group,
    Installable,
    Tag,
    Revision,
    SuiteRevision,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::User,
        EntityType::Group,
        EntityType::Installable,
        EntityType::Tag,
        EntityType::Revision,
        EntityType::SuiteRevision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Group => "group",
            EntityType::Installable => "installable",
            EntityType::Tag => "tag",
            EntityType::Revision => "revision",
            EntityType::SuiteRevision => "suite_revision",
        }
    }

    /// Entities whose mutations are governed by installable grants.
    pub fn is_installable_governed(self) -> bool {
        matches!(
            self,
            EntityType::Installable
                | EntityType::Tag
                | EntityType::Revision
                | EntityType::SuiteRevision
        )
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.as_str() == value)
            .ok_or_else(|| AuthzError::InvalidEntityType(value.to_string()))
    }
}

/// Read visibility of a resource instance. Entities without a visibility flag
/// are public.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn from_public_flag(public: bool) -> Self {
        if public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_roundtrip() {
        for entity in EntityType::ALL {
            let parsed: EntityType = entity.as_str().parse().expect("parse entity");
            assert_eq!(parsed, entity);
        }
        assert!("package".parse::<EntityType>().is_err());
    }

    #[test]
    fn governed_entities() {
        assert!(!EntityType::User.is_installable_governed());
        assert!(!EntityType::Group.is_installable_governed());
        assert!(EntityType::Revision.is_installable_governed());
        assert!(EntityType::SuiteRevision.is_installable_governed());
    }

    #[test]
    fn user_id_parses_subject() {
        let id: UserId = "42".parse().expect("parse user id");
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
        assert!("user-42".parse::<UserId>().is_err());
    }

    #[test]
    fn visibility_from_flag() {
        assert_eq!(Visibility::from_public_flag(true), Visibility::Public);
        assert_eq!(Visibility::from_public_flag(false), Visibility::Private);
        assert_eq!(Visibility::default(), Visibility::Public);
    }
}
