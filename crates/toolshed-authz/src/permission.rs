//! Permission bitmask stored on grants and memberships.
//!
//! # Purpose
//! Gives the integer stored with every grant a fixed layout and answers
//! whether a set of bits covers an [`OperationClass`].
//!
//! # Key invariants
//! - `READ = 1`, `WRITE = 2`, `ADMIN = 4`.
//! - A higher class implies the lower ones: `ADMIN` covers writes and reads,
//!   `WRITE` covers reads.
//! - Unknown high bits are preserved but never grant anything.
//!
//! # Examples
//! ```rust
//! use toolshed_authz::{OperationClass, PermissionBits};
//!
//! let bits = PermissionBits::WRITE;
//! assert!(bits.covers(OperationClass::Read));
//! assert!(!bits.covers(OperationClass::Admin));
//! ```
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

use crate::OperationClass;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionBits(u32);

impl PermissionBits {
    pub const NONE: PermissionBits = PermissionBits(0);
    pub const READ: PermissionBits = PermissionBits(1);
    pub const WRITE: PermissionBits = PermissionBits(1 << 1);
    pub const ADMIN: PermissionBits = PermissionBits(1 << 2);
    pub const ALL: PermissionBits = PermissionBits(0b111);

    const NAMES: [(PermissionBits, &'static str); 3] = [
        (PermissionBits::READ, "read"),
        (PermissionBits::WRITE, "write"),
        (PermissionBits::ADMIN, "admin"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        PermissionBits(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Decode the signed integer used by SQL columns. Negative values carry no
    /// meaningful bits and decode to [`PermissionBits::NONE`].
    pub fn from_db(value: i32) -> Self {
        u32::try_from(value).map(PermissionBits).unwrap_or_default()
    }

    pub fn to_db(self) -> i32 {
        i32::try_from(self.0 & Self::ALL.0).unwrap_or_default()
    }

    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    pub fn contains(self, other: PermissionBits) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether these bits authorize an operation of `class`.
    pub fn covers(self, class: OperationClass) -> bool {
        let needed = match class {
            OperationClass::Read => Self::ALL.0,
            OperationClass::Write => Self::WRITE.0 | Self::ADMIN.0,
            OperationClass::Admin => Self::ADMIN.0,
        };
        self.0 & needed != 0
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for PermissionBits {
    type Output = PermissionBits;

    fn bitor(self, rhs: Self) -> Self::Output {
        PermissionBits(self.0 | rhs.0)
    }
}

impl BitOrAssign for PermissionBits {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<PermissionBits> for PermissionBits {
    fn from_iter<I: IntoIterator<Item = PermissionBits>>(iter: I) -> Self {
        iter.into_iter().fold(PermissionBits::NONE, BitOr::bitor)
    }
}

impl std::fmt::Display for PermissionBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.names();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
