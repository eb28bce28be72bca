use serde::{Deserialize, Serialize};
use toolshed_authz::EntityType;
use utoipa::ToSchema;

use super::{Entity, MAX_NAME_LEN, Record, ValidationError, dedup_ids, limit_text, require_text};

const MAX_URL_LEN: usize = 2048;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryType {
    RepositoryDependency,
    Tool,
    Suite,
    Viz,
    InteractiveEnvironment,
}

impl RepositoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            RepositoryType::RepositoryDependency => "repository_dependency",
            RepositoryType::Tool => "tool",
            RepositoryType::Suite => "suite",
            RepositoryType::Viz => "viz",
            RepositoryType::InteractiveEnvironment => "interactive_environment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "repository_dependency" => Some(RepositoryType::RepositoryDependency),
            "tool" => Some(RepositoryType::Tool),
            "suite" => Some(RepositoryType::Suite),
            "viz" => Some(RepositoryType::Viz),
            "interactive_environment" => Some(RepositoryType::InteractiveEnvironment),
            _ => None,
        }
    }
}

/// An installable artifact. Grants on installables are what every
/// ownership decision in the catalog ultimately consults.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Installable {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub remote_repository_url: Option<String>,
    #[serde(default)]
    pub homepage_url: Option<String>,
    pub repository_type: RepositoryType,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub revision_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct InstallableCreate {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub remote_repository_url: Option<String>,
    #[serde(default)]
    pub homepage_url: Option<String>,
    pub repository_type: RepositoryType,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub revision_ids: Vec<i64>,
}

impl Entity for Installable {
    const ENTITY: EntityType = EntityType::Installable;

    fn id(&self) -> i64 {
        self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name, MAX_NAME_LEN)?;
        if self.description.trim().is_empty() {
            return Err(ValidationError::new("description is required"));
        }
        for (field, value) in [
            ("remote_repository_url", &self.remote_repository_url),
            ("homepage_url", &self.homepage_url),
        ] {
            if let Some(value) = value {
                limit_text(field, value, MAX_URL_LEN)?;
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        dedup_ids(&mut self.tag_ids);
        dedup_ids(&mut self.revision_ids);
    }

    fn references(&self) -> Vec<(EntityType, i64)> {
        self.tag_ids
            .iter()
            .map(|id| (EntityType::Tag, *id))
            .chain(self.revision_ids.iter().map(|id| (EntityType::Revision, *id)))
            .collect()
    }

    fn into_record(self) -> Record {
        Record::Installable(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Installable(installable) => Some(installable),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_type_uses_snake_case() {
        let value = serde_json::to_value(RepositoryType::InteractiveEnvironment).expect("json");
        assert_eq!(value, serde_json::json!("interactive_environment"));
        let parsed: RepositoryType =
            serde_json::from_value(serde_json::json!("repository_dependency")).expect("parse");
        assert_eq!(parsed, RepositoryType::RepositoryDependency);
    }

    #[test]
    fn column_labels_match_the_wire_names() {
        for kind in [
            RepositoryType::RepositoryDependency,
            RepositoryType::Tool,
            RepositoryType::Suite,
            RepositoryType::Viz,
            RepositoryType::InteractiveEnvironment,
        ] {
            assert_eq!(serde_json::to_value(kind).expect("json"), kind.as_str());
            assert_eq!(RepositoryType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RepositoryType::parse("workflow"), None);
    }

    #[test]
    fn normalize_dedups_links() {
        let mut installable = Installable {
            id: 1,
            name: "bwa".to_string(),
            description: "aligner".to_string(),
            remote_repository_url: None,
            homepage_url: None,
            repository_type: RepositoryType::Tool,
            tag_ids: vec![2, 2, 1],
            revision_ids: vec![5, 5],
        };
        installable.normalize();
        assert_eq!(installable.tag_ids, vec![1, 2]);
        assert_eq!(installable.revision_ids, vec![5]);
        assert_eq!(installable.references().len(), 3);
    }
}
