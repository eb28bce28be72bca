//! Catalog authentication and authorization.
//!
//! # Purpose
//! Binds the pure rules of `toolshed-authz` to the catalog store: bearer
//! credential extraction, identity resolution, fact gathering, the grant
//! store and the per-request interception pipeline.
pub mod credential;
pub mod engine;
mod error;
pub mod grants;
pub mod identity;
pub mod keys;
pub mod pipeline;

pub use error::AuthError;
