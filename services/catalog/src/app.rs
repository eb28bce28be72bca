//! Catalog HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! Every entity type gets the same route shape: a collection path serving
//! list, create and bulk update, and an instance path serving get, update and
//! delete. Users do not accept bulk updates.
use crate::api;
use crate::auth::pipeline::Pipeline;
use crate::observability;
use crate::store::CatalogStore;
use axum::Router;
use axum::routing::{get, post, put};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub pipeline: Arc<Pipeline>,
    /// Upper bound for one request's unit of work.
    pub store_timeout: Duration,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route("/api/system/health", get(api::system::system_health))
        .route("/api/openapi.json", get(api::openapi::openapi_json))
        .route("/api/auth/token", post(api::token::issue_token))
        .route(
            "/api/user",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/api/user/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .patch(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route(
            "/api/group",
            get(api::groups::list_groups)
                .post(api::groups::create_group)
                .patch(api::groups::update_groups),
        )
        .route(
            "/api/group/:id",
            get(api::groups::get_group)
                .put(api::groups::update_group)
                .patch(api::groups::update_group)
                .delete(api::groups::delete_group),
        )
        .route("/api/group/:id/members", get(api::grants::list_members))
        .route(
            "/api/group/:id/members/:user_id",
            put(api::grants::put_member).delete(api::grants::remove_member),
        )
        .route(
            "/api/installable",
            get(api::installables::list_installables)
                .post(api::installables::create_installable)
                .patch(api::installables::update_installables),
        )
        .route(
            "/api/installable/:id",
            get(api::installables::get_installable)
                .put(api::installables::update_installable)
                .patch(api::installables::update_installable)
                .delete(api::installables::delete_installable),
        )
        .route(
            "/api/installable/:id/grants",
            get(api::grants::list_grants).post(api::grants::add_grant),
        )
        .route(
            "/api/installable/:id/grants/:kind/:grant_id",
            axum::routing::delete(api::grants::revoke_grant),
        )
        .route(
            "/api/tag",
            get(api::tags::list_tags)
                .post(api::tags::create_tag)
                .patch(api::tags::update_tags),
        )
        .route(
            "/api/tag/:id",
            get(api::tags::get_tag)
                .put(api::tags::update_tag)
                .patch(api::tags::update_tag)
                .delete(api::tags::delete_tag),
        )
        .route(
            "/api/revision",
            get(api::revisions::list_revisions)
                .post(api::revisions::create_revision)
                .patch(api::revisions::update_revisions),
        )
        .route(
            "/api/revision/:id",
            get(api::revisions::get_revision)
                .put(api::revisions::update_revision)
                .patch(api::revisions::update_revision)
                .delete(api::revisions::delete_revision),
        )
        .route(
            "/api/suite_revision",
            get(api::suite_revisions::list_suite_revisions)
                .post(api::suite_revisions::create_suite_revision)
                .patch(api::suite_revisions::update_suite_revisions),
        )
        .route(
            "/api/suite_revision/:id",
            get(api::suite_revisions::get_suite_revision)
                .put(api::suite_revisions::update_suite_revision)
                .patch(api::suite_revisions::update_suite_revision)
                .delete(api::suite_revisions::delete_suite_revision),
        )
        .layer(trace_layer)
        .with_state(state)
}
