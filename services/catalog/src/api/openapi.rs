//! OpenAPI document for the catalog API, served at `/api/openapi.json`.
use crate::api::types::{
    ErrorResponse, Filter, FilterOp, FilterQuery, HealthStatus, ListResponse, NumModified,
    TokenRequest, TokenResponse,
};
use crate::api::{
    grants, groups, installables, revisions, suite_revisions, system, tags, token, users,
};
use crate::model::{
    Grant, GrantRequest, Group, GroupCreate, Installable, InstallableCreate, Membership,
    MembershipRequest, PrincipalKind, RepositoryType, Revision, RevisionCreate, SuiteRevision,
    SuiteRevisionCreate, Tag, TagCreate, User, UserCreate,
};
use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "toolshed-catalog",
        version = "v1",
        description = "Toolshed catalog HTTP API"
    ),
    paths(
        system::system_health,
        token::issue_token,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        groups::list_groups,
        groups::create_group,
        groups::update_groups,
        groups::get_group,
        groups::update_group,
        groups::delete_group,
        installables::list_installables,
        installables::create_installable,
        installables::update_installables,
        installables::get_installable,
        installables::update_installable,
        installables::delete_installable,
        tags::list_tags,
        tags::create_tag,
        tags::update_tags,
        tags::get_tag,
        tags::update_tag,
        tags::delete_tag,
        revisions::list_revisions,
        revisions::create_revision,
        revisions::update_revisions,
        revisions::get_revision,
        revisions::update_revision,
        revisions::delete_revision,
        suite_revisions::list_suite_revisions,
        suite_revisions::create_suite_revision,
        suite_revisions::update_suite_revisions,
        suite_revisions::get_suite_revision,
        suite_revisions::update_suite_revision,
        suite_revisions::delete_suite_revision,
        grants::list_grants,
        grants::add_grant,
        grants::revoke_grant,
        grants::list_members,
        grants::put_member,
        grants::remove_member
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        ListResponse,
        NumModified,
        FilterQuery,
        Filter,
        FilterOp,
        TokenRequest,
        TokenResponse,
        User,
        UserCreate,
        Group,
        GroupCreate,
        Installable,
        InstallableCreate,
        RepositoryType,
        Tag,
        TagCreate,
        Revision,
        RevisionCreate,
        SuiteRevision,
        SuiteRevisionCreate,
        Grant,
        GrantRequest,
        PrincipalKind,
        Membership,
        MembershipRequest
    )),
    tags(
        (name = "system", description = "Health"),
        (name = "auth", description = "Token issuance"),
        (name = "user", description = "Self-registered users"),
        (name = "group", description = "Groups and their administration"),
        (name = "installable", description = "Installables"),
        (name = "tag", description = "Tags"),
        (name = "revision", description = "Revisions"),
        (name = "suite_revision", description = "Suite revisions"),
        (name = "grants", description = "Grants and group memberships")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
