//! Operation kinds requested against catalog entities and the permission
//! class each one needs.
use serde::{Deserialize, Serialize};

use crate::AuthzError;

/// What the caller wants to do with an entity type or one of its instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    ReadSingle,
    ReadMany,
    UpdateSingle,
    UpdateMany,
    Delete,
    /// Administration of grants or memberships attached to a resource.
    ManageGrants,
}

/// Coarse permission class an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Read,
    Write,
    Admin,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Create,
        Operation::ReadSingle,
        Operation::ReadMany,
        Operation::UpdateSingle,
        Operation::UpdateMany,
        Operation::Delete,
        Operation::ManageGrants,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::ReadSingle => "read_single",
            Operation::ReadMany => "read_many",
            Operation::UpdateSingle => "update_single",
            Operation::UpdateMany => "update_many",
            Operation::Delete => "delete",
            Operation::ManageGrants => "manage_grants",
        }
    }

    /// Permission class required to perform the operation.
    ///
    /// Bulk updates are admin-level because they fan out over instances the
    /// caller did not name individually.
    pub fn class(self) -> OperationClass {
        match self {
            Operation::ReadSingle | Operation::ReadMany => OperationClass::Read,
            Operation::Create | Operation::UpdateSingle => OperationClass::Write,
            Operation::UpdateMany | Operation::Delete | Operation::ManageGrants => {
                OperationClass::Admin
            }
        }
    }

    pub fn is_read(self) -> bool {
        self.class() == OperationClass::Read
    }

    pub fn is_mutating(self) -> bool {
        !self.is_read()
    }

    /// True for operations addressed to a collection rather than one instance.
    pub fn is_collection_level(self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::ReadMany | Operation::UpdateMany
        )
    }
}

impl OperationClass {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationClass::Read => "read",
            OperationClass::Write => "write",
            OperationClass::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == value)
            .ok_or_else(|| AuthzError::InvalidOperation(value.to_string()))
    }
}
