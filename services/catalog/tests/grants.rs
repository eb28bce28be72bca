mod common;

use axum::http::StatusCode;
use common::TestApp;
use http_helpers::{authed_json_request, empty_request};
use serde_json::json;

#[tokio::test]
async fn creator_owns_new_installable() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "bwa").await;

    let (status, body) = app
        .send(empty_request(
            "GET",
            &format!("/api/installable/{id}/grants"),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let grants = body.as_array().expect("grant list");
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["kind"], "user");
    assert_eq!(grants[0]["principal_id"], owner.id);
    assert_eq!(grants[0]["permissions"], 7);
}

#[tokio::test]
async fn write_grants_allow_edits_but_not_administration() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let helper = app.register("bob").await;
    let id = app.installable(&owner, "bwa").await;
    let grants_uri = format!("/api/installable/{id}/grants");

    let (status, grant) = app
        .send(authed_json_request(
            "POST",
            &grants_uri,
            Some(&owner.token),
            json!({"kind": "user", "principal_id": helper.id, "permissions": 2}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(grant["permissions"], 2);

    let uri = format!("/api/installable/{id}");
    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &uri,
            Some(&helper.token),
            json!({"description": "co-maintained"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(empty_request("DELETE", &uri, Some(&helper.token)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .send(empty_request("GET", &grants_uri, Some(&helper.token)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("{grants_uri}/user/{}", grant["id"]),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &uri,
            Some(&helper.token),
            json!({"description": "still mine?"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_grant_requests_are_rejected() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let id = app.installable(&owner, "bwa").await;
    let grants_uri = format!("/api/installable/{id}/grants");

    for body in [
        json!({"kind": "user", "principal_id": owner.id, "permissions": 0}),
        json!({"kind": "group", "principal_id": 4242, "permissions": 1}),
        json!({"kind": "robot", "principal_id": owner.id, "permissions": 1}),
    ] {
        let (status, response) = app
            .send(authed_json_request("POST", &grants_uri, Some(&owner.token), body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{response}");
    }

    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("{grants_uri}/robot/1"),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn group_grants_reach_every_member() {
    let app = TestApp::new();
    let owner = app.register("ada").await;
    let lead = app.register("carol").await;
    let member = app.register("dave").await;
    let id = app.installable(&owner, "bwa").await;

    let group = app
        .create(
            &lead,
            "group",
            json!({"display_name": "iuc", "description": "tool curators"}),
        )
        .await;
    assert_eq!(group["api_key"].as_str().map(str::len), Some(32));
    let group_id = group["id"].as_i64().expect("group id");

    let (status, membership) = app
        .send(authed_json_request(
            "PUT",
            &format!("/api/group/{group_id}/members/{}", member.id),
            Some(&lead.token),
            json!({"permissions": 1}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(membership["permissions"], 1);

    let (status, grant) = app
        .send(authed_json_request(
            "POST",
            &format!("/api/installable/{id}/grants"),
            Some(&owner.token),
            json!({"kind": "group", "principal_id": group_id, "permissions": 2}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/installable/{id}");
    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &uri,
            Some(&member.token),
            json!({"description": "curated"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("/api/installable/{id}/grants/group/{}", grant["id"]),
            Some(&owner.token),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &uri,
            Some(&member.token),
            json!({"description": "curated again"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn group_administration_follows_membership_bits() {
    let app = TestApp::new();
    let lead = app.register("carol").await;
    let member = app.register("dave").await;
    let group = app
        .create(
            &lead,
            "group",
            json!({"display_name": "iuc", "description": "tool curators"}),
        )
        .await;
    let group_id = group["id"].as_i64().expect("group id");
    let members_uri = format!("/api/group/{group_id}/members");

    let (_, _) = app
        .send(authed_json_request(
            "PUT",
            &format!("{members_uri}/{}", member.id),
            Some(&lead.token),
            json!({"permissions": 1}),
        ))
        .await;

    let (status, body) = app
        .send(empty_request("GET", &format!("/api/group/{group_id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("api_key").is_none());

    let (status, _) = app
        .send(authed_json_request(
            "PATCH",
            &format!("/api/group/{group_id}"),
            Some(&member.token),
            json!({"description": "renamed"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("{members_uri}/{}", lead.id),
            Some(&member.token),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, members) = app
        .send(empty_request("GET", &members_uri, Some(&lead.token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members.as_array().map(Vec::len), Some(2));

    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("{members_uri}/{}", member.id),
            Some(&lead.token),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .send(empty_request(
            "DELETE",
            &format!("{members_uri}/{}", member.id),
            Some(&lead.token),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
