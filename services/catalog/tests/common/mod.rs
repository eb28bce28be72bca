#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use catalog::app::{AppState, build_router};
use catalog::auth::keys::token_authority_from_config;
use catalog::auth::pipeline::Pipeline;
use catalog::config::CatalogConfig;
use catalog::store::CatalogStore;
use catalog::store::memory::InMemoryStore;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const SHA_A: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
pub const SHA_B: &str = "60303ae22b998861bce3b28f33eec1be758a213c86c93c076dbe9f558c11c752";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn CatalogStore>,
}

/// A registered user with a bearer token.
pub struct Member {
    pub id: i64,
    pub email: String,
    pub api_key: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn CatalogStore>) -> Self {
        Self::with_store_timeout(store, CatalogConfig::for_tests().store_timeout)
    }

    pub fn with_store_timeout(store: Arc<dyn CatalogStore>, store_timeout: Duration) -> Self {
        let config = CatalogConfig::for_tests();
        let tokens = token_authority_from_config(&config.token).expect("token authority");
        let state = AppState {
            store: store.clone(),
            pipeline: Arc::new(Pipeline::new(tokens)),
            store_timeout,
        };
        TestApp {
            router: build_router(state),
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        (status, read_json(response).await)
    }

    pub async fn register(&self, name: &str) -> Member {
        let email = format!("{name}@example.org");
        let (status, body) = self
            .send(crate::http_helpers::json_request(
                "POST",
                "/api/user",
                json!({"display_name": name, "email": email}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {name}: {body}");
        let id = body["id"].as_i64().expect("user id");
        let api_key = body["api_key"].as_str().expect("api key").to_string();
        let token = self.token(&email, &api_key).await;
        Member {
            id,
            email,
            api_key,
            token,
        }
    }

    pub async fn token(&self, email: &str, api_key: &str) -> String {
        let (status, body) = self
            .send(crate::http_helpers::json_request(
                "POST",
                "/api/auth/token",
                json!({"email": email, "api_key": api_key}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "token: {body}");
        body["access_token"].as_str().expect("token").to_string()
    }

    /// POST `body` to `/api/{entity}` as `member`, expecting 201.
    pub async fn create(&self, member: &Member, entity: &str, body: Value) -> Value {
        let (status, created) = self
            .send(crate::http_helpers::authed_json_request(
                "POST",
                &format!("/api/{entity}"),
                Some(&member.token),
                body,
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create {entity}: {created}");
        created
    }

    pub async fn installable(&self, owner: &Member, name: &str) -> i64 {
        let created = self
            .create(
                owner,
                "installable",
                json!({
                    "name": name,
                    "description": format!("{name} tool"),
                    "repository_type": "tool"
                }),
            )
            .await;
        created["id"].as_i64().expect("installable id")
    }

    pub async fn revision(&self, owner: &Member, installable: i64, version: &str, public: bool) -> i64 {
        let created = self
            .create(
                owner,
                "revision",
                json!({
                    "version": version,
                    "commit_message": format!("release {version}"),
                    "public": public,
                    "tar_gz_sha256": SHA_A,
                    "installable_ids": [installable]
                }),
            )
            .await;
        created["id"].as_i64().expect("revision id")
    }
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json")
}
