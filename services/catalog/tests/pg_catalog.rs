#![cfg(feature = "pg-tests")]
//! End-to-end catalog flows on Postgres.
//!
//! Requires `CATALOG_TEST_DATABASE_URL` (or `DATABASE_URL`); tests are
//! skipped otherwise. Run with `cargo test -p catalog --features pg-tests`.
mod common;

use axum::http::StatusCode;
use catalog::config::PostgresConfig;
use catalog::store::postgres::PostgresStore;
use common::TestApp;
use http_helpers::{authed_json_request, empty_request};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

async fn pg_app() -> Option<TestApp> {
    let url = match std::env::var("CATALOG_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping pg-tests: set CATALOG_TEST_DATABASE_URL or DATABASE_URL");
            return None;
        }
    };
    let config = PostgresConfig {
        url,
        max_connections: 5,
        connect_timeout_ms: 5_000,
        acquire_timeout_ms: 5_000,
    };
    let store = match PostgresStore::connect(&config).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("skipping pg-tests: cannot connect to postgres: {err}");
            return None;
        }
    };
    if let Err(err) = sqlx::query(
        "TRUNCATE users, groups, installables, tags, revisions, suite_revisions RESTART IDENTITY CASCADE",
    )
    .execute(store.pool())
    .await
    {
        eprintln!("skipping pg-tests: cannot reset schema: {err}");
        return None;
    }
    Some(TestApp::with_store(Arc::new(store)))
}

#[tokio::test]
#[serial]
async fn ownership_flow_on_postgres() {
    let Some(app) = pg_app().await else {
        return;
    };
    let owner = app.register("ada").await;
    let stranger = app.register("bob").await;
    let id = app.installable(&owner, "bwa").await;
    let private = app.revision(&owner, id, "1.0.0", false).await;

    let (status, _) = app
        .send(empty_request("GET", &format!("/api/revision/{private}"), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/installable/{id}"),
            Some(&stranger.token),
            json!({"description": "mine"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("/api/installable/{id}"),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
#[serial]
async fn rejected_bulk_update_leaves_rows_unchanged_on_postgres() {
    let Some(app) = pg_app().await else {
        return;
    };
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let mine = app.installable(&ada, "samtools").await;
    app.installable(&bob, "bowtie").await;

    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            "/api/installable",
            Some(&ada.token),
            json!({"description": "taken over"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (_, body) = app
        .send(empty_request("GET", &format!("/api/installable/{mine}"), None))
        .await;
    assert_eq!(body["description"], "samtools tool");
}
