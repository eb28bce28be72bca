use serde::{Deserialize, Serialize};
use toolshed_authz::PermissionBits;
use utoipa::ToSchema;

/// Who holds a direct grant on an installable.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Group => "group",
        }
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(PrincipalKind::User),
            "group" => Ok(PrincipalKind::Group),
            other => Err(format!("unknown principal kind: {other}")),
        }
    }
}

/// Direct grant of permission bits on an installable. At most one grant
/// exists per (principal, installable).
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Grant {
    pub id: i64,
    pub kind: PrincipalKind,
    pub principal_id: i64,
    pub installable_id: i64,
    #[schema(value_type = u32)]
    pub permissions: PermissionBits,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct GrantRequest {
    pub kind: PrincipalKind,
    pub principal_id: i64,
    #[schema(value_type = u32)]
    pub permissions: PermissionBits,
}

/// A user's membership in a group. The bits govern administration of the
/// group itself; any membership makes the group's installable grants apply.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Membership {
    pub user_id: i64,
    pub group_id: i64,
    #[schema(value_type = u32)]
    pub permissions: PermissionBits,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct MembershipRequest {
    #[schema(value_type = u32)]
    pub permissions: PermissionBits,
}
