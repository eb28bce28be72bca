//! Catalog HTTP API.
//!
//! # Purpose
//! One handler module per entity type, all delegating to the generic
//! dispatcher in [`crud`], plus token issuance, grant management, health
//! and the OpenAPI document.
pub mod crud;
pub mod error;
pub mod grants;
pub mod groups;
pub mod installables;
pub mod openapi;
pub mod revisions;
pub mod suite_revisions;
pub mod system;
pub mod tags;
pub mod token;
pub mod types;
pub mod users;
