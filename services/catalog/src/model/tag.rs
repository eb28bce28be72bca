use serde::{Deserialize, Serialize};
use toolshed_authz::EntityType;
use utoipa::ToSchema;

use super::{Entity, MAX_NAME_LEN, Record, ValidationError, require_text};

/// Free-form label attached to installables. A tag is governed by every
/// installable that links it.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub display_name: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct TagCreate {
    pub display_name: String,
    pub description: String,
    /// Installables to link the new tag into.
    #[serde(default)]
    pub installable_ids: Vec<i64>,
}

impl Entity for Tag {
    const ENTITY: EntityType = EntityType::Tag;

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("display_name", &self.display_name, MAX_NAME_LEN)?;
        if self.description.trim().is_empty() {
            return Err(ValidationError::new("description is required"));
        }
        Ok(())
    }

    fn into_record(self) -> Record {
        Record::Tag(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Tag(tag) => Some(tag),
            _ => None,
        }
    }
}
