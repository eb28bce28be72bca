use serde::{Deserialize, Serialize};
use toolshed_authz::EntityType;
use utoipa::ToSchema;

use super::{
    API_KEY_LEN, Entity, MAX_GPG_KEY_ID_LEN, MAX_NAME_LEN, Record, ValidationError,
    limit_optional, limit_text, require_text,
};

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub display_name: String,
    pub api_key: String,
    pub description: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub gpg_pubkey_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct GroupCreate {
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub gpg_pubkey_id: Option<String>,
}

impl Entity for Group {
    const ENTITY: EntityType = EntityType::Group;

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("display_name", &self.display_name, MAX_NAME_LEN)?;
        if self.description.trim().is_empty() {
            return Err(ValidationError::new("description is required"));
        }
        if let Some(website) = &self.website {
            limit_text("website", website, 2048)?;
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
        Record::Group(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Group(group) => Some(group),
            _ => None,
        }
    }
}
