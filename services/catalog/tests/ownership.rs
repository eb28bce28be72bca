mod common;

use axum::http::StatusCode;
use common::TestApp;
use http_helpers::{authed_json_request, empty_request, json_request};
use serde_json::json;

#[tokio::test]
async fn installables_are_publicly_readable() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "bwa").await;

    let (status, body) = app
        .send(empty_request("GET", &format!("/api/installable/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "bwa");

    let (status, body) = app.send(empty_request("GET", "/api/installable", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["num_results"], 1);
    assert_eq!(body["objects"][0]["id"], id);
}

#[tokio::test]
async fn anonymous_mutation_is_unauthorized() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "bwa").await;

    let (status, body) = app
        .send(json_request(
            "PATCH",
            &format!("/api/installable/{id}"),
            json!({"description": "hijacked"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"description": "Not Authorized"}));

    let (status, _) = app
        .send(json_request(
            "POST",
            "/api/installable",
            json!({"name": "x", "description": "x", "repository_type": "tool"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_owners_modify_installables() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let stranger = app.register("bob").await;
    let id = app.installable(&owner, "bwa").await;
    let uri = format!("/api/installable/{id}");

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            &uri,
            Some(&owner.token),
            json!({"description": "aligner"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "aligner");

    let (status, _) = app
        .send(authed_json_request(
            "PUT",
            &uri,
            Some(&stranger.token),
            json!({"description": "mine now"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(empty_request("DELETE", &uri, Some(&stranger.token)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.send(empty_request("GET", &uri, None)).await;
    assert_eq!(body["description"], "aligner");
}

#[tokio::test]
async fn repeated_patch_is_idempotent() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "bwa").await;
    let uri = format!("/api/installable/{id}");
    let patch = json!({"homepage_url": "https://example.org/bwa"});

    let (_, first) = app
        .send(authed_json_request("PATCH", &uri, Some(&owner.token), patch.clone()))
        .await;
    let (status, second) = app
        .send(authed_json_request("PATCH", &uri, Some(&owner.token), patch))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
}

#[tokio::test]
async fn unknown_records_are_not_found_for_authenticated_callers() {
    let app = TestApp::new();
    let owner = app.register("ada").await;

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            "/api/installable/999",
            Some(&owner.token),
            json!({"description": "x"}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["description"], "installable 999 not found");

    let (status, _) = app
        .send(empty_request("GET", "/api/tag/999", None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn immutable_fields_are_rejected() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "bwa").await;

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/installable/{id}"),
            Some(&owner.token),
            json!({"id": 77}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["description"], "field id cannot be modified");
}

#[tokio::test]
async fn deleting_an_installable_removes_its_suite_revisions() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "suite_rna").await;
    let suite = app
        .create(
            &owner,
            "suite_revision",
            json!({
                "version": "1.0.0",
                "commit_message": "first suite",
                "installable": id
            }),
        )
        .await;
    let suite_id = suite["id"].as_i64().expect("suite id");

    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("/api/installable/{id}"),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(empty_request(
            "GET",
            &format!("/api/suite_revision/{suite_id}"),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tags_follow_the_installables_that_use_them() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let stranger = app.register("bob").await;
    let id = app.installable(&owner, "bwa").await;
    let tag = app
        .create(
            &owner,
            "tag",
            json!({
                "display_name": "alignment",
                "description": "read aligners",
                "installable_ids": [id]
            }),
        )
        .await;
    let tag_id = tag["id"].as_i64().expect("tag id");

    let (_, installable) = app
        .send(empty_request("GET", &format!("/api/installable/{id}"), None))
        .await;
    assert_eq!(installable["tag_ids"], json!([tag_id]));

    let uri = format!("/api/tag/{tag_id}");
    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &uri,
            Some(&stranger.token),
            json!({"description": "spam"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            &uri,
            Some(&owner.token),
            json!({"description": "short read aligners"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "short read aligners");
}

#[tokio::test]
async fn linking_a_foreign_tag_is_unauthorized() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let stranger = app.register("bob").await;
    let id = app.installable(&owner, "bwa").await;
    let tag = app
        .create(
            &owner,
            "tag",
            json!({
                "display_name": "alignment",
                "description": "read aligners",
                "installable_ids": [id]
            }),
        )
        .await;
    let tag_id = tag["id"].as_i64().expect("tag id");
    let theirs = app.installable(&stranger, "evil").await;

    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/installable/{theirs}"),
            Some(&stranger.token),
            json!({"tag_ids": [tag_id]}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(authed_json_request(
            "POST",
            "/api/installable",
            Some(&stranger.token),
            json!({
                "name": "evil2",
                "description": "squatter",
                "repository_type": "tool",
                "tag_ids": [tag_id]
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/tag/{tag_id}"),
            Some(&owner.token),
            json!({"description": "mine"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "mine");
}

#[tokio::test]
async fn unlinked_tags_can_be_linked_by_anyone() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "bwa").await;
    let tag = app
        .create(
            &owner,
            "tag",
            json!({"display_name": "genomics", "description": "genomics tools"}),
        )
        .await;
    let tag_id = tag["id"].as_i64().expect("tag id");

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/installable/{id}"),
            Some(&owner.token),
            json!({"tag_ids": [tag_id]}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tag_ids"], json!([tag_id]));
}
