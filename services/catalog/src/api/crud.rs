//! Generic CRUD dispatcher.
//!
//! # Purpose
//! Implements list, read, create, update, bulk update and delete once for
//! every catalog entity. The per-entity handler modules supply a
//! [`Resource`] describing what differs: patchable and redacted fields,
//! the create payload, creator grants and which installables a new record
//! belongs to.
//!
//! # Key invariants
//! - Each request is exactly one unit of work. Authorization facts are read
//!   in the transaction that performs the write, and nothing is committed
//!   unless the handler reaches the end.
//! - The unit of work runs under `store_timeout`; expiry drops the
//!   transaction (rolling it back) and answers 503.
//! - Bulk updates authorize every matched instance before the first write.
//! - Read responses never carry redacted fields, and filters cannot name
//!   them.
use axum::body::Bytes;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::future::Future;
use toolshed_authz::{EntityType, Operation};

use crate::api::error::{
    ApiError, api_internal, api_method_not_allowed, api_not_found, api_unavailable,
    api_validation_error,
};
use crate::api::types::{Filter, FilterOp, FilterQuery, ListParams, ListResponse, NumModified};
use crate::app::AppState;
use crate::auth::engine::Target;
use crate::auth::grants::GrantStore;
use crate::auth::pipeline::Admission;
use crate::model::{Entity, Record};
use crate::store::{CatalogTx, LockMode, cascade};

/// Lifecycle grant handed to the creator of a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorGrant {
    OwnInstallable,
    AdministerGroup,
}

/// A record built from a create payload, plus the installables it should be
/// linked into once stored.
#[derive(Debug, Clone)]
pub struct NewRecord<T> {
    pub record: T,
    pub link_into: Vec<i64>,
}

impl<T> NewRecord<T> {
    pub fn unlinked(record: T) -> Self {
        NewRecord {
            record,
            link_into: Vec::new(),
        }
    }
}

/// Per-entity metadata for the generic dispatcher.
pub trait Resource: Entity {
    type Create: DeserializeOwned + Send + 'static;

    /// Fields present in read responses, in the order they are documented.
    const FIELDS: &'static [&'static str];
    /// Fields a PUT/PATCH may change.
    const PATCHABLE: &'static [&'static str];
    /// Fields stripped from read responses.
    const REDACTED: &'static [&'static str] = &[];
    const BULK_UPDATE: bool = true;
    const CREATOR_GRANT: Option<CreatorGrant> = None;

    fn from_create(create: Self::Create) -> NewRecord<Self>;

    /// Installables whose grants decide whether the create is allowed.
    fn governing_on_create(new: &NewRecord<Self>) -> Vec<i64> {
        new.link_into.clone()
    }
}

/// Run one unit of work under the configured store timeout.
pub(crate) async fn unit_of_work<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(state.store_timeout, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.store_timeout.as_millis() as u64,
                "unit of work timed out"
            );
            Err(api_unavailable())
        }
    }
}

pub async fn list<T: Resource>(
    state: &AppState,
    headers: &HeaderMap,
    params: ListParams,
) -> Result<ListResponse, ApiError> {
    let filters = parse_filters::<T>(params.q.as_deref())?;
    unit_of_work(state, async {
        let mut tx = state.store.begin().await?;
        let mut admission = state
            .pipeline
            .admit(headers, tx.as_mut(), T::ENTITY, Operation::ReadMany)
            .await?;
        let candidates = matching::<T>(tx.list(T::ENTITY, LockMode::Shared).await?, &filters)?;
        let readable = admission.filter_readable(tx.as_mut(), candidates).await?;
        admission.proceed();
        let objects = readable
            .iter()
            .map(read_view::<T>)
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit().await?;
        Ok(ListResponse {
            num_results: objects.len(),
            objects,
        })
    })
    .await
}

pub async fn get<T: Resource>(
    state: &AppState,
    headers: &HeaderMap,
    id: i64,
) -> Result<Value, ApiError> {
    unit_of_work(state, async {
        let mut tx = state.store.begin().await?;
        let mut admission = state
            .pipeline
            .admit(headers, tx.as_mut(), T::ENTITY, Operation::ReadSingle)
            .await?;
        let record = load(tx.as_mut(), T::ENTITY, id).await?;
        admission
            .authorize(tx.as_mut(), Target::Instance(&record))
            .await?;
        admission.proceed();
        let view = read_view::<T>(&record)?;
        tx.commit().await?;
        Ok(view)
    })
    .await
}

/// Create a record. The response carries the full stored record, including
/// server-generated secrets, exactly once.
pub async fn create<T: Resource>(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Value, ApiError> {
    let payload: T::Create = serde_json::from_slice(&body)?;
    let new = T::from_create(payload);
    let governing = T::governing_on_create(&new);
    let NewRecord {
        mut record,
        link_into,
    } = new;
    record.normalize();
    record.validate()?;
    let record = record.into_record();

    unit_of_work(state, async {
        let mut tx = state.store.begin().await?;
        let mut admission = state
            .pipeline
            .admit(headers, tx.as_mut(), T::ENTITY, Operation::Create)
            .await?;
        check_write(tx.as_mut(), &record).await?;
        for installable_id in &link_into {
            load_reference(tx.as_mut(), EntityType::Installable, *installable_id).await?;
        }
        admission
            .authorize(
                tx.as_mut(),
                Target::Collection {
                    governing: &governing,
                },
            )
            .await?;
        authorize_new_links(&mut admission, tx.as_mut(), None, &record).await?;
        let actor = admission.proceed();

        let stored = tx.insert(record).await?;
        for installable_id in &link_into {
            link_into_installable(tx.as_mut(), *installable_id, &stored).await?;
        }
        if let (Some(grant), Some(actor)) = (T::CREATOR_GRANT, actor) {
            let mut grants = GrantStore::new(tx.as_mut());
            match grant {
                CreatorGrant::OwnInstallable => {
                    grants.on_installable_created(actor.id, stored.id()).await?;
                }
                CreatorGrant::AdministerGroup => {
                    grants.on_group_created(actor.id, stored.id()).await?;
                }
            }
        }
        let body = stored
            .to_body()
            .map_err(|err| api_internal("failed to encode record", &err))?;
        tx.commit().await?;
        tracing::info!(
            entity = T::ENTITY.as_str(),
            id = stored.id(),
            "record created"
        );
        Ok(body)
    })
    .await
}

/// Partial update of one record. PUT and PATCH share these semantics.
pub async fn update<T: Resource>(
    state: &AppState,
    headers: &HeaderMap,
    id: i64,
    body: Bytes,
) -> Result<Value, ApiError> {
    let patch = parse_patch::<T>(&body)?;
    unit_of_work(state, async {
        let mut tx = state.store.begin().await?;
        let mut admission = state
            .pipeline
            .admit(headers, tx.as_mut(), T::ENTITY, Operation::UpdateSingle)
            .await?;
        let existing = load(tx.as_mut(), T::ENTITY, id).await?;
        admission
            .authorize(tx.as_mut(), Target::Instance(&existing))
            .await?;
        let updated = apply_patch::<T>(&existing, &patch)?;
        check_write(tx.as_mut(), &updated).await?;
        authorize_new_links(&mut admission, tx.as_mut(), Some(&existing), &updated).await?;
        admission.proceed();
        let stored = tx.update(updated).await?;
        let view = read_view::<T>(&stored)?;
        tx.commit().await?;
        Ok(view)
    })
    .await
}

/// Apply one patch to every record matching the filter, all or nothing.
pub async fn update_many<T: Resource>(
    state: &AppState,
    headers: &HeaderMap,
    params: ListParams,
    body: Bytes,
) -> Result<NumModified, ApiError> {
    if !T::BULK_UPDATE {
        return Err(api_method_not_allowed(&format!(
            "bulk update is not offered for {}",
            T::ENTITY.as_str()
        )));
    }
    let filters = parse_filters::<T>(params.q.as_deref())?;
    let patch = parse_patch::<T>(&body)?;
    unit_of_work(state, async {
        let mut tx = state.store.begin().await?;
        let mut admission = state
            .pipeline
            .admit(headers, tx.as_mut(), T::ENTITY, Operation::UpdateMany)
            .await?;
        let matched = matching::<T>(tx.list(T::ENTITY, LockMode::ForUpdate).await?, &filters)?;
        admission.authorize_each(tx.as_mut(), &matched).await?;

        let mut staged = Vec::with_capacity(matched.len());
        for existing in &matched {
            let updated = apply_patch::<T>(existing, &patch)?;
            check_write(tx.as_mut(), &updated).await?;
            authorize_new_links(&mut admission, tx.as_mut(), Some(existing), &updated).await?;
            staged.push(updated);
        }
        admission.proceed();
        let num_modified = staged.len() as u64;
        for updated in staged {
            tx.update(updated).await?;
        }
        tx.commit().await?;
        tracing::info!(
            entity = T::ENTITY.as_str(),
            num_modified,
            "bulk update applied"
        );
        Ok(NumModified { num_modified })
    })
    .await
}

pub async fn delete<T: Resource>(
    state: &AppState,
    headers: &HeaderMap,
    id: i64,
) -> Result<(), ApiError> {
    unit_of_work(state, async {
        let mut tx = state.store.begin().await?;
        let mut admission = state
            .pipeline
            .admit(headers, tx.as_mut(), T::ENTITY, Operation::Delete)
            .await?;
        let existing = load(tx.as_mut(), T::ENTITY, id).await?;
        admission
            .authorize(tx.as_mut(), Target::Instance(&existing))
            .await?;
        admission.proceed();
        cascade::delete(tx.as_mut(), T::ENTITY, id).await?;
        tx.commit().await?;
        tracing::info!(entity = T::ENTITY.as_str(), id, "record deleted");
        Ok(())
    })
    .await
}

pub(crate) async fn load(
    tx: &mut dyn CatalogTx,
    entity: EntityType,
    id: i64,
) -> Result<Record, ApiError> {
    tx.get(entity, id)
        .await?
        .ok_or_else(|| api_not_found(&format!("{} {id} not found", entity.as_str())))
}

/// Like [`load`], but a missing record is the client's fault (400).
async fn load_reference(
    tx: &mut dyn CatalogTx,
    entity: EntityType,
    id: i64,
) -> Result<Record, ApiError> {
    tx.get(entity, id).await?.ok_or_else(|| {
        api_validation_error(&format!("{} {id} does not exist", entity.as_str()))
    })
}

/// Referential checks that need the store.
async fn check_write(tx: &mut dyn CatalogTx, record: &Record) -> Result<(), ApiError> {
    for (entity, id) in record.references() {
        load_reference(tx, entity, id).await?;
    }
    if let Record::Revision(revision) = record {
        ensure_acyclic_replacement(tx, revision.id, revision.replacement_revision).await?;
    }
    Ok(())
}

async fn ensure_acyclic_replacement(
    tx: &mut dyn CatalogTx,
    id: i64,
    replacement: Option<i64>,
) -> Result<(), ApiError> {
    let mut seen = HashSet::from([id]);
    let mut next = replacement;
    while let Some(current) = next {
        if !seen.insert(current) {
            return Err(api_validation_error(
                "replacement_revision would create a cycle",
            ));
        }
        next = match load_reference(tx, EntityType::Revision, current).await? {
            Record::Revision(revision) => revision.replacement_revision,
            _ => None,
        };
    }
    Ok(())
}

/// Linking an existing revision or tag into an installable requires the
/// right to update it. A tag no installable links yet is free to link.
async fn authorize_new_links(
    admission: &mut Admission,
    tx: &mut dyn CatalogTx,
    before: Option<&Record>,
    after: &Record,
) -> Result<(), ApiError> {
    let Record::Installable(installable) = after else {
        return Ok(());
    };
    let (known_revisions, known_tags): (HashSet<i64>, HashSet<i64>) = match before {
        Some(Record::Installable(previous)) => (
            previous.revision_ids.iter().copied().collect(),
            previous.tag_ids.iter().copied().collect(),
        ),
        _ => (HashSet::new(), HashSet::new()),
    };
    for revision_id in &installable.revision_ids {
        if known_revisions.contains(revision_id) {
            continue;
        }
        let revision = load_reference(tx, EntityType::Revision, *revision_id).await?;
        admission.authorize_link(tx, &revision).await?;
    }
    for tag_id in &installable.tag_ids {
        if known_tags.contains(tag_id) {
            continue;
        }
        let tag = load_reference(tx, EntityType::Tag, *tag_id).await?;
        if tx.installables_linking(EntityType::Tag, *tag_id).await?.is_empty() {
            continue;
        }
        admission.authorize_link(tx, &tag).await?;
    }
    Ok(())
}

async fn link_into_installable(
    tx: &mut dyn CatalogTx,
    installable_id: i64,
    linked: &Record,
) -> Result<(), ApiError> {
    let Record::Installable(mut installable) =
        load_reference(tx, EntityType::Installable, installable_id).await?
    else {
        return Err(api_validation_error("link target is not an installable"));
    };
    match linked {
        Record::Revision(revision) => installable.revision_ids.push(revision.id),
        Record::Tag(tag) => installable.tag_ids.push(tag.id),
        _ => return Ok(()),
    }
    installable.normalize();
    tx.update(Record::Installable(installable)).await?;
    Ok(())
}

/// JSON body of a PUT/PATCH, restricted to patchable fields.
fn parse_patch<T: Resource>(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    let Value::Object(patch) = serde_json::from_slice::<Value>(body)? else {
        return Err(api_validation_error("patch body must be a JSON object"));
    };
    if let Some(field) = patch.keys().find(|key| !T::PATCHABLE.contains(&key.as_str())) {
        return Err(api_validation_error(&format!(
            "field {field} cannot be modified"
        )));
    }
    Ok(patch)
}

fn apply_patch<T: Resource>(existing: &Record, patch: &Map<String, Value>) -> Result<Record, ApiError> {
    let mut body = existing
        .to_body()
        .map_err(|err| api_internal("failed to encode record", &err))?;
    if let Value::Object(fields) = &mut body {
        for (key, value) in patch {
            fields.insert(key.clone(), value.clone());
        }
    }
    let mut entity: T = serde_json::from_value(body)?;
    entity.normalize();
    entity.validate()?;
    Ok(entity.into_record())
}

fn read_view<T: Resource>(record: &Record) -> Result<Value, ApiError> {
    let mut body = record
        .to_body()
        .map_err(|err| api_internal("failed to encode record", &err))?;
    if let Value::Object(fields) = &mut body {
        for field in T::REDACTED {
            fields.remove(*field);
        }
    }
    Ok(body)
}

pub(crate) fn parse_filters<T: Resource>(q: Option<&str>) -> Result<Vec<Filter>, ApiError> {
    let Some(q) = q.filter(|q| !q.trim().is_empty()) else {
        return Ok(Vec::new());
    };
    let query: FilterQuery = serde_json::from_str(q)
        .map_err(|err| api_validation_error(&format!("invalid filter: {err}")))?;
    for filter in &query.filters {
        if !T::FIELDS.contains(&filter.name.as_str()) {
            return Err(api_validation_error(&format!(
                "cannot filter on {}",
                filter.name
            )));
        }
        if filter.op == FilterOp::In && !filter.val.is_array() {
            return Err(api_validation_error("the in operator needs a list value"));
        }
    }
    Ok(query.filters)
}

fn matching<T: Resource>(records: Vec<Record>, filters: &[Filter]) -> Result<Vec<Record>, ApiError> {
    if filters.is_empty() {
        return Ok(records);
    }
    let mut matched = Vec::new();
    for record in records {
        if filters_match(&read_view::<T>(&record)?, filters) {
            matched.push(record);
        }
    }
    Ok(matched)
}

fn filters_match(view: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        let field = view.get(&filter.name).unwrap_or(&Value::Null);
        match filter.op {
            FilterOp::Eq => field == &filter.val,
            FilterOp::Neq => field != &filter.val,
            FilterOp::In => filter
                .val
                .as_array()
                .is_some_and(|values| values.contains(field)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Tag, User};
    use serde_json::json;

    #[test]
    fn patch_rejects_fields_outside_the_patchable_set() {
        assert!(parse_patch::<Tag>(br#"{"description": "new"}"#).is_ok());
        let err = parse_patch::<Tag>(br#"{"id": 9}"#).expect_err("id is not patchable");
        assert_eq!(err.body.description, "field id cannot be modified");
        assert!(parse_patch::<User>(br#"{"api_key": "x"}"#).is_err());
        assert!(parse_patch::<Tag>(b"[1, 2]").is_err());
        assert!(parse_patch::<Tag>(b"not json").is_err());
    }

    #[test]
    fn filters_cannot_name_redacted_fields() {
        assert!(parse_filters::<User>(Some(r#"{"filters":[{"name":"display_name","op":"eq","val":"Ada"}]}"#)).is_ok());
        assert!(parse_filters::<User>(Some(r#"{"filters":[{"name":"email","op":"eq","val":"a@b"}]}"#)).is_err());
        assert!(parse_filters::<Tag>(Some(r#"{"filters":[{"name":"id","op":"in","val":3}]}"#)).is_err());
        assert!(parse_filters::<Tag>(Some("{")).is_err());
        assert!(parse_filters::<Tag>(None).expect("no filter").is_empty());
    }

    #[test]
    fn filter_operators_compare_json_values() {
        let view = json!({"id": 3, "display_name": "genomics", "description": null});
        let filter = |name: &str, op, val| Filter {
            name: name.to_string(),
            op,
            val,
        };
        assert!(filters_match(&view, &[filter("id", FilterOp::Eq, json!(3))]));
        assert!(filters_match(&view, &[filter("id", FilterOp::Neq, json!(4))]));
        assert!(filters_match(&view, &[filter("id", FilterOp::In, json!([1, 3]))]));
        assert!(!filters_match(
            &view,
            &[
                filter("id", FilterOp::Eq, json!(3)),
                filter("display_name", FilterOp::Eq, json!("viz")),
            ]
        ));
    }

    #[test]
    fn read_view_strips_secrets() {
        let user = Record::User(User {
            id: 1,
            display_name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            api_key: "d".repeat(32),
            gpg_pubkey_id: None,
        });
        let view = read_view::<User>(&user).expect("view");
        assert!(view.get("email").is_none());
        assert!(view.get("api_key").is_none());
        assert_eq!(view["display_name"], "Ada");
    }

    #[test]
    fn patch_merges_and_revalidates() {
        let tag = Record::Tag(Tag {
            id: 5,
            display_name: "genomics".to_string(),
            description: "sequence tools".to_string(),
        });
        let mut patch = Map::new();
        patch.insert("description".to_string(), json!("updated"));
        let updated = apply_patch::<Tag>(&tag, &patch).expect("patched");
        assert_eq!(updated.id(), 5);
        assert_eq!(updated.to_body().expect("body")["description"], "updated");

        patch.insert("display_name".to_string(), json!(""));
        assert!(apply_patch::<Tag>(&tag, &patch).is_err());
    }
}
