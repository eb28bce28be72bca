use serde_json::Value;
use toolshed_authz::{EntityType, Visibility};

use super::{Entity, Group, Installable, Revision, SuiteRevision, Tag, User, ValidationError};

/// Any stored catalog entity. This is the unit the store reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    User(User),
    Group(Group),
    Installable(Installable),
    Tag(Tag),
    Revision(Revision),
    SuiteRevision(SuiteRevision),
}

macro_rules! each_record {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            Record::User($inner) => $body,
            Record::Group($inner) => $body,
            Record::Installable($inner) => $body,
            Record::Tag($inner) => $body,
            Record::Revision($inner) => $body,
            Record::SuiteRevision($inner) => $body,
        }
    };
}

impl Record {
    pub fn entity(&self) -> EntityType {
        match self {
            Record::User(_) => EntityType::User,
            Record::Group(_) => EntityType::Group,
            Record::Installable(_) => EntityType::Installable,
            Record::Tag(_) => EntityType::Tag,
            Record::Revision(_) => EntityType::Revision,
            Record::SuiteRevision(_) => EntityType::SuiteRevision,
        }
    }

    pub fn id(&self) -> i64 {
        each_record!(self, inner => inner.id)
    }

    pub fn set_id(&mut self, id: i64) {
        each_record!(self, inner => inner.id = id)
    }

    pub fn visibility(&self) -> Visibility {
        each_record!(self, inner => inner.visibility())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        each_record!(self, inner => inner.validate())
    }

    pub fn references(&self) -> Vec<(EntityType, i64)> {
        each_record!(self, inner => inner.references())
    }

    /// JSON body as served by the API and merged by partial updates.
    pub fn to_body(&self) -> serde_json::Result<Value> {
        each_record!(self, inner => serde_json::to_value(inner))
    }

    pub fn into_entity<T: Entity>(self) -> Option<T> {
        T::from_record(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_the_assigned_id() {
        let mut record = Record::Tag(crate::model::Tag {
            id: 0,
            display_name: "genomics".to_string(),
            description: "sequence tools".to_string(),
        });
        record.set_id(12);
        let body = record.to_body().expect("body");
        assert_eq!(body["id"], 12);
        assert_eq!(body["display_name"], "genomics");
        assert_eq!(record.entity(), EntityType::Tag);
    }
}
