//! HTTP API request/response types.
//!
//! # Purpose
//! Defines the payload shapes shared across catalog endpoints and the
//! OpenAPI document.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

/// Every error body has exactly this shape.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub storage: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ListResponse {
    pub num_results: usize,
    #[schema(value_type = Vec<Object>)]
    pub objects: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
pub struct NumModified {
    pub num_modified: u64,
}

#[derive(Debug, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// JSON filter document: `{"filters":[{"name":..,"op":"eq|neq|in","val":..}]}`.
    pub q: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterQuery {
    #[serde(default)]
    pub filters: Vec<Filter>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub name: String,
    pub op: FilterOp,
    #[schema(value_type = Object)]
    pub val: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    In,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    pub email: String,
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}
