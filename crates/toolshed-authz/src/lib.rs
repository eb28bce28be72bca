//! Authorization primitives for the toolshed catalog.
//!
//! # Purpose
//! Centralizes the access model shared by catalog services: operation kinds
//! and their permission classes, the grant bitmask, entity kinds, the pure
//! rule engine and bearer token handling.
//!
//! # How it fits
//! The catalog service verifies bearer tokens with [`TokenAuthority`],
//! gathers [`TargetFacts`] from its store inside the request transaction and
//! asks [`evaluate`] for a [`Decision`]. Nothing in this crate performs I/O.
//!
//! # Key invariants
//! - Tokens are EdDSA/Ed25519 only.
//! - Permission bits are `READ = 1`, `WRITE = 2`, `ADMIN = 4` and higher bits
//!   imply lower ones.
//! - The engine denies anything no rule allows.
//!
//! # Examples
//! ```rust
//! use toolshed_authz::{AccessRequest, EntityType, Operation, TargetFacts, evaluate};
//!
//! let anonymous_read = AccessRequest {
//!     actor: None,
//!     entity: EntityType::Installable,
//!     instance: Some(1),
//!     operation: Operation::ReadSingle,
//! };
//! assert!(evaluate(&anonymous_read, &TargetFacts::default()).is_allowed());
//! ```
//!
//! # Common pitfalls
//! - Gathering facts outside the transaction that performs the write lets a
//!   concurrent grant change slip between the check and the mutation.

mod engine;
mod errors;
mod operation;
mod permission;
mod token;
mod types;

pub use engine::{AccessRequest, Decision, DenyReason, TargetFacts, evaluate};
pub use errors::{AuthzError, AuthzResult, CredentialError};
pub use operation::{Operation, OperationClass};
pub use permission::PermissionBits;
pub use token::{
    CatalogClaims, SigningKey, SigningKeySet, TOKEN_AUDIENCE, TOKEN_ISSUER, TOKEN_TYPE,
    TokenAuthority, bearer_token,
};
pub use types::{EntityType, UserId, Visibility};
