//! Request interception pipeline.
//!
//! # Purpose
//! Runs authentication and authorization for every CRUD and grant request
//! before the handler touches storage. Each (entity, operation) pair gets a
//! fixed chain of [`Step`]s composed once at startup; handlers then walk the
//! chain through an [`Admission`].
//!
//! # How it fits
//! ```text
//! headers -> credential -> identity -> Admission -> engine::decide -> Proceed
//!                                          \-> AuthError -> 401/503
//! ```
//!
//! # Key invariants
//! - A present but bad credential aborts, even where authentication is
//!   optional.
//! - Every decision is written to the `catalog::audit` target and counted in
//!   `catalog_authz_decisions_total`.
//! - Nothing is retried; transient store failures abort with
//!   [`AuthError::Store`].
use axum::http::HeaderMap;
use std::collections::HashMap;
use toolshed_authz::{Decision, DenyReason, EntityType, Operation, TokenAuthority, UserId};

use crate::auth::engine::{self, Target};
use crate::auth::identity::{self, Actor};
use crate::auth::{AuthError, credential};
use crate::model::Record;
use crate::observability::AUTHZ_DECISIONS_TOTAL;
use crate::store::CatalogTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authentication {
    Required,
    /// No credential means anonymous; a bad credential still aborts.
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Authenticate(Authentication),
    /// One decision for the addressed instance or collection.
    Authorize,
    /// One decision per matched instance; any denial aborts the whole batch.
    AuthorizeEachInstance,
    /// One decision per listed instance; denied instances are dropped.
    FilterEachInstance,
}

/// Progress of one request through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Authenticating,
    Authenticated,
    AuthFailed,
    Authorizing,
    Authorized,
    Denied,
    Proceed,
    Abort,
}

impl Stage {
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Start, Authenticating)
                | (Authenticating, Authenticated | AuthFailed)
                | (AuthFailed, Abort)
                | (Authenticated, Authorizing | Proceed)
                | (Authorizing, Authorized | Denied | Abort)
                | (Authorized, Authorizing | Proceed)
                | (Denied, Abort)
        )
    }
}

/// Step chains keyed by (entity, operation).
#[derive(Debug, Clone)]
pub struct PipelineTable {
    chains: HashMap<(EntityType, Operation), Vec<Step>>,
}

impl PipelineTable {
    pub fn compose() -> Self {
        let mut chains = HashMap::new();
        for entity in EntityType::ALL {
            for operation in Operation::ALL {
                if let Some(chain) = chain_for(entity, operation) {
                    chains.insert((entity, operation), chain);
                }
            }
        }
        PipelineTable { chains }
    }

    pub fn steps(&self, entity: EntityType, operation: Operation) -> Option<&[Step]> {
        self.chains.get(&(entity, operation)).map(Vec::as_slice)
    }
}

fn chain_for(entity: EntityType, operation: Operation) -> Option<Vec<Step>> {
    match (entity, operation) {
        (EntityType::User, Operation::UpdateMany) => return None,
        (EntityType::Installable | EntityType::Group, Operation::ManageGrants) => {}
        (_, Operation::ManageGrants) => return None,
        _ => {}
    }
    let self_registration = (entity, operation) == (EntityType::User, Operation::Create);
    let authentication = if operation.is_read() || self_registration {
        Authentication::Optional
    } else {
        Authentication::Required
    };
    let authorization = match operation {
        Operation::ReadMany => Step::FilterEachInstance,
        Operation::UpdateMany => Step::AuthorizeEachInstance,
        _ => Step::Authorize,
    };
    Some(vec![Step::Authenticate(authentication), authorization])
}

pub struct Pipeline {
    table: PipelineTable,
    tokens: TokenAuthority,
}

impl Pipeline {
    pub fn new(tokens: TokenAuthority) -> Self {
        Pipeline {
            table: PipelineTable::compose(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn table(&self) -> &PipelineTable {
        &self.table
    }

    /// Run the authentication step for `(entity, operation)`.
    ///
    /// # Errors
    /// - [`AuthError::Unauthenticated`] or [`AuthError::ActorNotFound`] when
    ///   the credential does not resolve to a user.
    /// - [`AuthError::NotAuthorized`] when no chain exists for the pair.
    pub async fn admit(
        &self,
        headers: &HeaderMap,
        tx: &mut dyn CatalogTx,
        entity: EntityType,
        operation: Operation,
    ) -> Result<Admission, AuthError> {
        let Some(&[Step::Authenticate(mode), check]) = self.table.steps(entity, operation) else {
            let reason = DenyReason::NoMatchingRule;
            record(None, entity, operation, None, "deny", Some(reason.as_str()));
            return Err(AuthError::NotAuthorized(DenyReason::NoMatchingRule));
        };
        let mut admission = Admission {
            entity,
            operation,
            check,
            actor: None,
            stage: Stage::Start,
        };
        admission.advance(Stage::Authenticating);
        match self.authenticate(headers, tx, mode).await {
            Ok(actor) => {
                admission.actor = actor;
                admission.advance(Stage::Authenticated);
                Ok(admission)
            }
            Err(err) => {
                admission.advance(Stage::AuthFailed);
                admission.advance(Stage::Abort);
                let detail = err.to_string();
                record(None, entity, operation, None, err.outcome(), Some(&detail));
                Err(err)
            }
        }
    }

    async fn authenticate(
        &self,
        headers: &HeaderMap,
        tx: &mut dyn CatalogTx,
        mode: Authentication,
    ) -> Result<Option<Actor>, AuthError> {
        let claims = match mode {
            Authentication::Required => {
                Some(credential::verify_required(&self.tokens, headers)?)
            }
            Authentication::Optional => credential::verify_optional(&self.tokens, headers)?,
        };
        match claims {
            Some(claims) => Ok(Some(identity::resolve(tx, &claims).await?)),
            None => Ok(None),
        }
    }
}

/// An authenticated request waiting for its authorization decisions.
#[derive(Debug)]
pub struct Admission {
    entity: EntityType,
    operation: Operation,
    check: Step,
    actor: Option<Actor>,
    stage: Stage,
}

impl Admission {
    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    pub fn actor_id(&self) -> Option<UserId> {
        self.actor.as_ref().map(|actor| actor.id)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Decide for the addressed instance, or for a collection-level create.
    pub async fn authorize(
        &mut self,
        tx: &mut dyn CatalogTx,
        target: Target<'_>,
    ) -> Result<(), AuthError> {
        self.expect_check(Step::Authorize)?;
        self.enforce(tx, self.entity, self.operation, &target).await
    }

    /// All-or-nothing decision over the instances a bulk request matched.
    pub async fn authorize_each(
        &mut self,
        tx: &mut dyn CatalogTx,
        records: &[Record],
    ) -> Result<(), AuthError> {
        self.expect_check(Step::AuthorizeEachInstance)?;
        self.advance(Stage::Authorizing);
        for record in records {
            let target = Target::Instance(record);
            self.enforce(tx, self.entity, self.operation, &target).await?;
            self.advance(Stage::Authorizing);
        }
        self.advance(Stage::Authorized);
        Ok(())
    }

    /// Keep the records the actor may read.
    pub async fn filter_readable(
        &mut self,
        tx: &mut dyn CatalogTx,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, AuthError> {
        self.expect_check(Step::FilterEachInstance)?;
        self.advance(Stage::Authorizing);
        let actor = self.actor_id();
        let mut readable = Vec::with_capacity(records.len());
        for candidate in records {
            let target = Target::Instance(&candidate);
            let decision =
                engine::decide(tx, actor, self.entity, self.operation, &target).await?;
            let reason = match decision {
                Decision::Allow => None,
                Decision::Deny(reason) => Some(reason.as_str()),
            };
            record(
                actor,
                self.entity,
                self.operation,
                Some(candidate.id()),
                decision.as_str(),
                reason,
            );
            if decision.is_allowed() {
                readable.push(candidate);
            }
        }
        self.advance(Stage::Authorized);
        Ok(readable)
    }

    /// Linking an existing record into an installable counts as updating it.
    pub async fn authorize_link(
        &mut self,
        tx: &mut dyn CatalogTx,
        linked: &Record,
    ) -> Result<(), AuthError> {
        let target = Target::Instance(linked);
        self.enforce(tx, linked.entity(), Operation::UpdateSingle, &target)
            .await
    }

    /// Finish the pipeline and hand the actor to the handler.
    pub fn proceed(mut self) -> Option<Actor> {
        self.advance(Stage::Proceed);
        self.actor
    }

    async fn enforce(
        &mut self,
        tx: &mut dyn CatalogTx,
        entity: EntityType,
        operation: Operation,
        target: &Target<'_>,
    ) -> Result<(), AuthError> {
        if self.stage != Stage::Authorizing {
            self.advance(Stage::Authorizing);
        }
        let actor = self.actor_id();
        let decision = match engine::decide(tx, actor, entity, operation, target).await {
            Ok(decision) => decision,
            Err(err) => {
                self.advance(Stage::Abort);
                let err = AuthError::from(err);
                let detail = err.to_string();
                let instance = target.instance_id();
                record(actor, entity, operation, instance, err.outcome(), Some(&detail));
                return Err(err);
            }
        };
        let instance = target.instance_id();
        match decision {
            Decision::Allow => {
                record(actor, entity, operation, instance, decision.as_str(), None);
                self.advance(Stage::Authorized);
                Ok(())
            }
            Decision::Deny(reason) => {
                record(
                    actor,
                    entity,
                    operation,
                    instance,
                    decision.as_str(),
                    Some(reason.as_str()),
                );
                self.advance(Stage::Denied);
                self.advance(Stage::Abort);
                Err(AuthError::NotAuthorized(reason))
            }
        }
    }

    fn expect_check(&self, step: Step) -> Result<(), AuthError> {
        if self.check == step {
            return Ok(());
        }
        tracing::error!(
            entity = self.entity.as_str(),
            operation = self.operation.as_str(),
            expected = ?self.check,
            requested = ?step,
            "handler requested an authorization step outside its chain"
        );
        Err(AuthError::NotAuthorized(DenyReason::NoMatchingRule))
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "invalid pipeline transition {:?} -> {next:?}",
            self.stage
        );
        self.stage = next;
    }
}

fn record(
    actor: Option<UserId>,
    entity: EntityType,
    operation: Operation,
    instance: Option<i64>,
    outcome: &'static str,
    reason: Option<&str>,
) {
    tracing::info!(
        target: "catalog::audit",
        actor = ?actor.map(UserId::get),
        entity = entity.as_str(),
        operation = operation.as_str(),
        instance = ?instance,
        outcome,
        reason = reason.unwrap_or(""),
        "authorization decision"
    );
    metrics::counter!(
        AUTHZ_DECISIONS_TOTAL,
        "entity" => entity.as_str(),
        "operation" => operation.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Installable, PrincipalKind, RepositoryType, Revision, User};
    use crate::store::CatalogStore;
    use crate::store::memory::InMemoryStore;
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;
    use std::time::Duration;
    use toolshed_authz::{CredentialError, PermissionBits, SigningKeySet};

    fn pipeline() -> Pipeline {
        let tokens = TokenAuthority::new(SigningKeySet::generate(), Duration::from_secs(60), 0)
            .expect("authority");
        Pipeline::new(tokens)
    }

    fn bearer(pipeline: &Pipeline, user: i64) -> HeaderMap {
        let token = pipeline.tokens().mint(UserId::new(user)).expect("mint");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    fn user(email: &str) -> Record {
        Record::User(User {
            id: 0,
            display_name: email.to_string(),
            email: email.to_string(),
            api_key: "c".repeat(32),
            gpg_pubkey_id: None,
        })
    }

    fn installable() -> Record {
        Record::Installable(Installable {
            id: 0,
            name: "samtools".to_string(),
            description: "sam utilities".to_string(),
            remote_repository_url: None,
            homepage_url: None,
            repository_type: RepositoryType::Tool,
            tag_ids: Vec::new(),
            revision_ids: Vec::new(),
        })
    }

    fn revision(version: &str, public: bool) -> Record {
        Record::Revision(Revision {
            id: 0,
            version: version.to_string(),
            commit_message: "release".to_string(),
            public,
            uploaded: chrono::Utc::now(),
            tar_gz_sha256: "a".repeat(64),
            tar_gz_sig_available: false,
            replacement_revision: None,
        })
    }

    #[test]
    fn chains_are_composed_per_entity_and_operation() {
        let table = PipelineTable::compose();
        assert_eq!(
            table.steps(EntityType::Revision, Operation::ReadSingle),
            Some(
                &[
                    Step::Authenticate(Authentication::Optional),
                    Step::Authorize
                ][..]
            )
        );
        assert_eq!(
            table.steps(EntityType::User, Operation::Create),
            Some(
                &[
                    Step::Authenticate(Authentication::Optional),
                    Step::Authorize
                ][..]
            )
        );
        assert_eq!(
            table.steps(EntityType::Tag, Operation::UpdateMany),
            Some(
                &[
                    Step::Authenticate(Authentication::Required),
                    Step::AuthorizeEachInstance
                ][..]
            )
        );
        assert_eq!(
            table.steps(EntityType::Group, Operation::ReadMany),
            Some(
                &[
                    Step::Authenticate(Authentication::Optional),
                    Step::FilterEachInstance
                ][..]
            )
        );
        assert_eq!(table.steps(EntityType::User, Operation::UpdateMany), None);
        assert_eq!(table.steps(EntityType::Tag, Operation::ManageGrants), None);
        assert!(
            table
                .steps(EntityType::Installable, Operation::ManageGrants)
                .is_some()
        );
    }

    #[test]
    fn stage_transitions_follow_the_request_lifecycle() {
        assert!(Stage::Start.can_advance_to(Stage::Authenticating));
        assert!(Stage::Authenticating.can_advance_to(Stage::AuthFailed));
        assert!(Stage::AuthFailed.can_advance_to(Stage::Abort));
        assert!(Stage::Authorizing.can_advance_to(Stage::Denied));
        assert!(Stage::Denied.can_advance_to(Stage::Abort));
        assert!(Stage::Authorized.can_advance_to(Stage::Proceed));

        assert!(!Stage::Start.can_advance_to(Stage::Authorized));
        assert!(!Stage::AuthFailed.can_advance_to(Stage::Authorizing));
        assert!(!Stage::Denied.can_advance_to(Stage::Proceed));
        assert!(!Stage::Abort.can_advance_to(Stage::Proceed));
    }

    #[tokio::test]
    async fn missing_credential_aborts_required_chain() {
        let pipeline = pipeline();
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.expect("begin");
        let err = pipeline
            .admit(
                &HeaderMap::new(),
                tx.as_mut(),
                EntityType::Installable,
                Operation::UpdateSingle,
            )
            .await
            .expect_err("anonymous mutation");
        assert!(matches!(
            err,
            AuthError::Unauthenticated(CredentialError::Missing)
        ));
    }

    #[tokio::test]
    async fn optional_chain_admits_anonymous_reads() {
        let pipeline = pipeline();
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.expect("begin");
        let inst = tx.insert(installable()).await.expect("installable");

        let mut admission = pipeline
            .admit(
                &HeaderMap::new(),
                tx.as_mut(),
                EntityType::Installable,
                Operation::ReadSingle,
            )
            .await
            .expect("admit");
        assert_eq!(admission.stage(), Stage::Authenticated);
        admission
            .authorize(tx.as_mut(), Target::Instance(&inst))
            .await
            .expect("public read");
        assert_eq!(admission.stage(), Stage::Authorized);
        assert_eq!(admission.proceed(), None);
    }

    #[tokio::test]
    async fn token_for_deleted_user_is_rejected() {
        let pipeline = pipeline();
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.expect("begin");
        let err = pipeline
            .admit(
                &bearer(&pipeline, 77),
                tx.as_mut(),
                EntityType::Tag,
                Operation::ReadMany,
            )
            .await
            .expect_err("unknown actor");
        assert!(matches!(err, AuthError::ActorNotFound(_)));
    }

    #[tokio::test]
    async fn bulk_denial_names_the_reason() {
        let pipeline = pipeline();
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.expect("begin");
        let owner = tx.insert(user("owner@example.org")).await.expect("user");
        let granted = tx.insert(installable()).await.expect("granted");
        let other = tx.insert(installable()).await.expect("other");
        tx.upsert_grant(
            PrincipalKind::User,
            owner.id(),
            granted.id(),
            PermissionBits::ALL,
        )
        .await
        .expect("grant");

        let mut admission = pipeline
            .admit(
                &bearer(&pipeline, owner.id()),
                tx.as_mut(),
                EntityType::Installable,
                Operation::UpdateMany,
            )
            .await
            .expect("admit");
        let err = admission
            .authorize_each(tx.as_mut(), &[granted, other])
            .await
            .expect_err("one instance is not granted");
        assert!(matches!(
            err,
            AuthError::NotAuthorized(DenyReason::InsufficientGrant)
        ));
        assert_eq!(admission.stage(), Stage::Abort);
    }

    #[tokio::test]
    async fn step_outside_chain_is_refused() {
        let pipeline = pipeline();
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.expect("begin");
        let mut admission = pipeline
            .admit(
                &HeaderMap::new(),
                tx.as_mut(),
                EntityType::Tag,
                Operation::ReadMany,
            )
            .await
            .expect("admit");
        let err = admission
            .authorize_each(tx.as_mut(), &[])
            .await
            .expect_err("wrong step");
        assert!(matches!(
            err,
            AuthError::NotAuthorized(DenyReason::NoMatchingRule)
        ));
    }

    #[tokio::test]
    async fn anonymous_listing_keeps_only_public_instances() {
        let pipeline = pipeline();
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.expect("begin");
        let public = tx.insert(revision("1.0", true)).await.expect("public");
        let hidden = tx.insert(revision("1.1", false)).await.expect("hidden");

        let mut admission = pipeline
            .admit(
                &HeaderMap::new(),
                tx.as_mut(),
                EntityType::Revision,
                Operation::ReadMany,
            )
            .await
            .expect("admit");
        let readable = admission
            .filter_readable(tx.as_mut(), vec![public.clone(), hidden])
            .await
            .expect("filter");
        assert_eq!(readable, vec![public]);
        assert_eq!(admission.stage(), Stage::Authorized);
    }
}
