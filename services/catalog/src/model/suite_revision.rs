use serde::{Deserialize, Serialize};
use toolshed_authz::EntityType;
use utoipa::ToSchema;

use super::{Entity, MAX_VERSION_LEN, Record, ValidationError, dedup_ids, require_text};

/// A versioned bundle of revisions owned by one installable.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct SuiteRevision {
    pub id: i64,
    pub version: String,
    pub commit_message: String,
    pub installable: i64,
    #[serde(default)]
    pub contained_revision_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct SuiteRevisionCreate {
    pub version: String,
    pub commit_message: String,
    pub installable: i64,
    #[serde(default)]
    pub contained_revision_ids: Vec<i64>,
}

impl Entity for SuiteRevision {
    const ENTITY: EntityType = EntityType::SuiteRevision;

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("version", &self.version, MAX_VERSION_LEN)?;
        if self.commit_message.trim().is_empty() {
            return Err(ValidationError::new("commit_message is required"));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        dedup_ids(&mut self.contained_revision_ids);
    }

    fn references(&self) -> Vec<(EntityType, i64)> {
        std::iter::once((EntityType::Installable, self.installable))
            .chain(
                self.contained_revision_ids
                    .iter()
                    .map(|id| (EntityType::Revision, *id)),
            )
            .collect()
    }

    fn into_record(self) -> Record {
        Record::SuiteRevision(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::SuiteRevision(suite) => Some(suite),
            _ => None,
        }
    }
}
