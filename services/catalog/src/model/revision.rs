use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolshed_authz::{EntityType, Visibility};
use utoipa::ToSchema;

use super::{Entity, MAX_VERSION_LEN, Record, ValidationError, require_text};

const SHA256_HEX_LEN: usize = 64;

/// One uploaded tarball of an installable.
///
/// `uploaded` is set by the service at creation. `replacement_revision` points
/// at the revision that supersedes this one; the chain must stay acyclic.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Revision {
    pub id: i64,
    pub version: String,
    pub commit_message: String,
    #[serde(default = "default_public")]
    pub public: bool,
    pub uploaded: DateTime<Utc>,
    pub tar_gz_sha256: String,
    #[serde(default)]
    pub tar_gz_sig_available: bool,
    #[serde(default)]
    pub replacement_revision: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct RevisionCreate {
    pub version: String,
    pub commit_message: String,
    #[serde(default = "default_public")]
    pub public: bool,
    pub tar_gz_sha256: String,
    #[serde(default)]
    pub tar_gz_sig_available: bool,
    #[serde(default)]
    pub replacement_revision: Option<i64>,
    /// Installables the revision belongs to; at least one is required.
    #[serde(default)]
    pub installable_ids: Vec<i64>,
}

fn default_public() -> bool {
    true
}

pub(crate) fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

impl Entity for Revision {
    const ENTITY: EntityType = EntityType::Revision;

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("version", &self.version, MAX_VERSION_LEN)?;
        if self.commit_message.trim().is_empty() {
            return Err(ValidationError::new("commit_message is required"));
        }
        if !is_sha256_hex(&self.tar_gz_sha256) {
            return Err(ValidationError::new(
                "tar_gz_sha256 must be 64 hexadecimal characters",
            ));
        }
        if self.replacement_revision == Some(self.id) {
            return Err(ValidationError::new(
                "replacement_revision cannot reference itself",
            ));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.tar_gz_sha256.make_ascii_lowercase();
    }

    fn references(&self) -> Vec<(EntityType, i64)> {
        self.replacement_revision
            .map(|id| (EntityType::Revision, id))
            .into_iter()
            .collect()
    }

    fn visibility(&self) -> Visibility {
        Visibility::from_public_flag(self.public)
    }

    fn into_record(self) -> Record {
        Record::Revision(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Revision(revision) => Some(revision),
            _ => None,
        }
    }
}
