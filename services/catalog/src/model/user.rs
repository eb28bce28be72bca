use serde::{Deserialize, Serialize};
use toolshed_authz::EntityType;
use utoipa::ToSchema;

use super::{
    API_KEY_LEN, Entity, MAX_GPG_KEY_ID_LEN, MAX_NAME_LEN, Record, ValidationError,
    limit_optional, require_text,
};

/// A registered catalog user. `email` and `api_key` never leave the service
/// on read paths.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub api_key: String,
    #[serde(default)]
    pub gpg_pubkey_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct UserCreate {
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub gpg_pubkey_id: Option<String>,
}

impl Entity for User {
    const ENTITY: EntityType = EntityType::User;

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("display_name", &self.display_name, MAX_NAME_LEN)?;
        require_text("email", &self.email, MAX_NAME_LEN)?;
        if !self.email.contains('@') {
            return Err(ValidationError::new("email must contain '@'"));
        }
        if self.api_key.len() != API_KEY_LEN {
            return Err(ValidationError::new("api_key has an invalid length"));
        }
        limit_optional(
            "gpg_pubkey_id",
            self.gpg_pubkey_id.as_deref(),
            MAX_GPG_KEY_ID_LEN,
        )
    }

    fn into_record(self) -> Record {
        Record::User(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::User(user) => Some(user),
            _ => None,
        }
    }
}
