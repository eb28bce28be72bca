mod common;

use axum::http::StatusCode;
use common::{SHA_A, SHA_B, TestApp};
use http_helpers::{authed_json_request, empty_request};
use serde_json::json;

#[tokio::test]
async fn private_revisions_need_a_read_grant() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let stranger = app.register("bob").await;
    let installable = app.installable(&owner, "bwa").await;
    let public = app.revision(&owner, installable, "1.0.0", true).await;
    let private = app.revision(&owner, installable, "1.1.0-rc1", false).await;

    let (status, _) = app
        .send(empty_request("GET", &format!("/api/revision/{public}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/revision/{private}");
    let (status, _) = app.send(empty_request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .send(empty_request("GET", &uri, Some(&stranger.token)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = app
        .send(empty_request("GET", &uri, Some(&owner.token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["public"], false);

    let (_, anonymous) = app.send(empty_request("GET", "/api/revision", None)).await;
    assert_eq!(anonymous["num_results"], 1);
    assert_eq!(anonymous["objects"][0]["id"], public);
    let (_, owned) = app
        .send(empty_request("GET", "/api/revision", Some(&owner.token)))
        .await;
    assert_eq!(owned["num_results"], 2);
}

#[tokio::test]
async fn revisions_must_be_created_inside_an_owned_installable() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let stranger = app.register("bob").await;
    let installable = app.installable(&owner, "bwa").await;

    let orphan = json!({
        "version": "1.0.0",
        "commit_message": "orphan",
        "tar_gz_sha256": SHA_A
    });
    let (status, _) = app
        .send(authed_json_request("POST", "/api/revision", Some(&owner.token), orphan))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let foreign = json!({
        "version": "1.0.0",
        "commit_message": "not mine",
        "tar_gz_sha256": SHA_A,
        "installable_ids": [installable]
    });
    let (status, _) = app
        .send(authed_json_request("POST", "/api/revision", Some(&stranger.token), foreign))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let malformed = json!({
        "version": "1.0.0",
        "commit_message": "bad digest",
        "tar_gz_sha256": "abc",
        "installable_ids": [installable]
    });
    let (status, body) = app
        .send(authed_json_request("POST", "/api/revision", Some(&owner.token), malformed))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["description"],
        "tar_gz_sha256 must be 64 hexadecimal characters"
    );

    let id = app.revision(&owner, installable, "1.0.0", true).await;
    let (_, linked) = app
        .send(empty_request("GET", &format!("/api/installable/{installable}"), None))
        .await;
    assert_eq!(linked["revision_ids"], json!([id]));
}

#[tokio::test]
async fn replacement_chains_cannot_loop() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let installable = app.installable(&owner, "bwa").await;
    let first = app.revision(&owner, installable, "1.0.0", true).await;
    let second = app
        .create(
            &owner,
            "revision",
            json!({
                "version": "1.0.1",
                "commit_message": "fix",
                "tar_gz_sha256": SHA_B,
                "replacement_revision": first,
                "installable_ids": [installable]
            }),
        )
        .await;
    let second = second["id"].as_i64().expect("revision id");

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/revision/{first}"),
            Some(&owner.token),
            json!({"replacement_revision": second}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["description"], "replacement_revision would create a cycle");

    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/revision/{first}"),
            Some(&owner.token),
            json!({"replacement_revision": first}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/revision/{first}"),
            Some(&owner.token),
            json!({"replacement_revision": 4242}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn linking_a_revision_needs_write_access_to_it() {
    let app = TestApp::new();
    let ada = app.register("ada").await;
    let bob = app.register("bob").await;
    let ada_tool = app.installable(&ada, "bwa").await;
    let ada_other = app.installable(&ada, "bwa-mem2").await;
    let bob_tool = app.installable(&bob, "bowtie").await;
    let revision = app.revision(&ada, ada_tool, "1.0.0", true).await;

    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/installable/{bob_tool}"),
            Some(&bob.token),
            json!({"revision_ids": [revision]}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/installable/{ada_other}"),
            Some(&ada.token),
            json!({"revision_ids": [revision]}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision_ids"], json!([revision]));
}
