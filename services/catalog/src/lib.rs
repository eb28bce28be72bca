//! Toolshed catalog service library crate.
//!
//! # Purpose
//! Exposes the catalog HTTP API, the authorization pipeline, configuration
//! and storage implementations for use by the binary and tests.
//!
//! # Notes
//! Authorization rules themselves live in the `toolshed-authz` crate; this
//! crate gathers the facts they need from the store.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod model;
pub mod observability;
pub mod store;
