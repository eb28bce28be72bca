//! Postgres-backed implementation of the catalog store.
//!
//! # Data model
//! - One table per entity (`users`, `groups`, `installables`, `tags`,
//!   `revisions`, `suite_revisions`). Ids come from the shared
//!   `catalog_record_ids` sequence, so an id names one record catalog-wide.
//! - Links live in join tables: `installable_tags`, `installable_revisions`
//!   and `suite_revision_revisions`. A `position` column keeps the order the
//!   client supplied. [`CatalogTx::installables_linking`] is a lookup on them.
//! - `user_group_memberships`, `installable_user_permissions` and
//!   `installable_group_permissions` reference users, groups and installables
//!   by foreign key, so grant lookups are a single aggregate query.
//!
//! # Consistency
//! Every unit of work is a `SERIALIZABLE` transaction. Bulk reads lock matched
//! rows with `FOR UPDATE`. Serialization failures and deadlocks surface as
//! [`StoreError::Transient`] so callers can answer 503 and clients can retry.
//!
//! # Operational notes
//! - Migrations run at startup via `sqlx::migrate!("./migrations")`; if they
//!   fail the service does not start.
//! - Pool sizing and acquire timeouts come from [`PostgresConfig`]; never
//!   log `url`, it may carry credentials.
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use toolshed_authz::{EntityType, PermissionBits, UserId};

use super::{CatalogStore, CatalogTx, LockMode, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::{
    Grant, Group, Installable, Membership, PrincipalKind, Record, RepositoryType, Revision,
    SuiteRevision, Tag, User,
};

pub struct PostgresStore {
    pool: PgPool,
}

/// Row shape for the `users` table.
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: i64,
    display_name: String,
    email: String,
    api_key: String,
    gpg_pubkey_id: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct DbGroup {
    id: i64,
    display_name: String,
    api_key: String,
    description: String,
    website: Option<String>,
    gpg_pubkey_id: Option<String>,
}

/// Row shape for `installables`. Tag and revision links are loaded from
/// their join tables.
#[derive(Debug, Clone, FromRow)]
struct DbInstallable {
    id: i64,
    name: String,
    description: String,
    remote_repository_url: Option<String>,
    homepage_url: Option<String>,
    repository_type: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbTag {
    id: i64,
    display_name: String,
    description: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbRevision {
    id: i64,
    version: String,
    commit_message: String,
    public: bool,
    uploaded: DateTime<Utc>,
    tar_gz_sha256: String,
    tar_gz_sig_available: bool,
    replacement_revision: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
struct DbSuiteRevision {
    id: i64,
    version: String,
    commit_message: String,
    installable_id: i64,
}

/// One row of a join table, ordered by `position` within its owner.
#[derive(Debug, Clone, FromRow)]
struct DbLink {
    owner_id: i64,
    linked_id: i64,
}

#[derive(Debug, Clone, FromRow)]
struct DbGrant {
    id: i64,
    principal_id: i64,
    installable_id: i64,
    permissions: Option<i32>,
}

#[derive(Debug, Clone, FromRow)]
struct DbMembership {
    user_id: i64,
    group_id: i64,
    permissions: i32,
}

impl PostgresStore {
    /// Connect, run migrations and return the store.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let store = Self::connect_without_migrations(pg).await?;
        sqlx::migrate!("./migrations")
            .run(&store.pool)
            .await
            .map_err(|err| StoreError::Unexpected(anyhow!("run migrations: {err}")))?;
        Ok(store)
    }

    /// Connect to a database whose schema is managed elsewhere.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

fn table(entity: EntityType) -> &'static str {
    match entity {
        EntityType::User => "users",
        EntityType::Group => "groups",
        EntityType::Installable => "installables",
        EntityType::Tag => "tags",
        EntityType::Revision => "revisions",
        EntityType::SuiteRevision => "suite_revisions",
    }
}

fn columns(entity: EntityType) -> &'static str {
    match entity {
        EntityType::User => "id, display_name, email, api_key, gpg_pubkey_id",
        EntityType::Group => "id, display_name, api_key, description, website, gpg_pubkey_id",
        EntityType::Installable => {
            "id, name, description, remote_repository_url, homepage_url, repository_type"
        }
        EntityType::Tag => "id, display_name, description",
        EntityType::Revision => {
            "id, version, commit_message, public, uploaded, tar_gz_sha256, \
             tar_gz_sig_available, replacement_revision"
        }
        EntityType::SuiteRevision => "id, version, commit_message, installable_id",
    }
}

fn select_sql(entity: EntityType, by_id: bool, lock: LockMode) -> String {
    let mut sql = format!("SELECT {} FROM {}", columns(entity), table(entity));
    if by_id {
        sql.push_str(" WHERE id = $1");
    }
    sql.push_str(" ORDER BY id");
    if matches!(lock, LockMode::ForUpdate) {
        sql.push_str(" FOR UPDATE");
    }
    sql
}

/// Join table holding `entity`'s outgoing links, with its owner and linked
/// columns.
struct LinkTable {
    table: &'static str,
    owner: &'static str,
    linked: &'static str,
}

const INSTALLABLE_TAGS: LinkTable = LinkTable {
    table: "installable_tags",
    owner: "installable_id",
    linked: "tag_id",
};
const INSTALLABLE_REVISIONS: LinkTable = LinkTable {
    table: "installable_revisions",
    owner: "installable_id",
    linked: "revision_id",
};
const SUITE_REVISION_REVISIONS: LinkTable = LinkTable {
    table: "suite_revision_revisions",
    owner: "suite_revision_id",
    linked: "revision_id",
};

impl LinkTable {
    fn select_sql(&self, by_owner: bool) -> String {
        let filter = if by_owner {
            format!(" WHERE {} = $1", self.owner)
        } else {
            String::new()
        };
        format!(
            "SELECT {owner} AS owner_id, {linked} AS linked_id FROM {table}{filter} \
             ORDER BY {owner}, position",
            owner = self.owner,
            linked = self.linked,
            table = self.table,
        )
    }

    fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE {} = $1", self.table, self.owner)
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {table} ({owner}, {linked}, position) \
             SELECT $1, linked.id, linked.position \
             FROM UNNEST($2::BIGINT[]) WITH ORDINALITY AS linked(id, position) \
             ON CONFLICT DO NOTHING",
            table = self.table,
            owner = self.owner,
            linked = self.linked,
        )
    }

    fn owners_sql(&self) -> String {
        format!(
            "SELECT {owner} FROM {table} WHERE {linked} = $1 ORDER BY {owner}",
            owner = self.owner,
            table = self.table,
            linked = self.linked,
        )
    }
}

fn group_links(rows: Vec<DbLink>) -> HashMap<i64, Vec<i64>> {
    let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in rows {
        links.entry(row.owner_id).or_default().push(row.linked_id);
    }
    links
}

fn installable_from_db(row: DbInstallable, links: &mut Links) -> StoreResult<Installable> {
    let repository_type = RepositoryType::parse(&row.repository_type).ok_or_else(|| {
        StoreError::Unexpected(anyhow!(
            "installable {} has unknown repository_type {:?}",
            row.id,
            row.repository_type
        ))
    })?;
    Ok(Installable {
        id: row.id,
        name: row.name,
        description: row.description,
        remote_repository_url: row.remote_repository_url,
        homepage_url: row.homepage_url,
        repository_type,
        tag_ids: links.tags.remove(&row.id).unwrap_or_default(),
        revision_ids: links.revisions.remove(&row.id).unwrap_or_default(),
    })
}

fn user_from_db(row: DbUser) -> User {
    User {
        id: row.id,
        display_name: row.display_name,
        email: row.email,
        api_key: row.api_key,
        gpg_pubkey_id: row.gpg_pubkey_id,
    }
}

/// Links of the rows being decoded, keyed by owner id.
#[derive(Default)]
struct Links {
    tags: HashMap<i64, Vec<i64>>,
    revisions: HashMap<i64, Vec<i64>>,
}

fn grant_from_db(kind: PrincipalKind, row: DbGrant) -> Grant {
    Grant {
        id: row.id,
        kind,
        principal_id: row.principal_id,
        installable_id: row.installable_id,
        permissions: row.permissions.map(PermissionBits::from_db).unwrap_or_default(),
    }
}

fn membership_from_db(row: DbMembership) -> Membership {
    Membership {
        user_id: row.user_id,
        group_id: row.group_id,
        permissions: PermissionBits::from_db(row.permissions),
    }
}

fn insert_sql(entity: EntityType) -> String {
    let count = columns(entity).split(", ").count();
    let placeholders = (1..=count)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        table(entity),
        columns(entity)
    )
}

/// `id` is always `$1`; the remaining columns follow in [`columns`] order.
fn update_sql(entity: EntityType) -> String {
    let assignments = columns(entity)
        .split(", ")
        .enumerate()
        .skip(1)
        .map(|(index, column)| format!("{column} = ${}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!("UPDATE {} SET {assignments} WHERE id = $1", table(entity))
}

fn grant_table_sql(kind: PrincipalKind) -> GrantSql {
    match kind {
        PrincipalKind::User => GrantSql {
            list: "SELECT id, user_id AS principal_id, installable_id, permissions \
                   FROM installable_user_permissions WHERE installable_id = $1 ORDER BY id",
            upsert: "INSERT INTO installable_user_permissions (user_id, installable_id, permissions) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (user_id, installable_id) DO UPDATE SET permissions = EXCLUDED.permissions \
                     RETURNING id, user_id AS principal_id, installable_id, permissions",
            delete: "DELETE FROM installable_user_permissions WHERE id = $1 AND installable_id = $2",
            delete_principal: "DELETE FROM installable_user_permissions WHERE user_id = $1",
            delete_installable: "DELETE FROM installable_user_permissions WHERE installable_id = $1",
        },
        PrincipalKind::Group => GrantSql {
            list: "SELECT id, group_id AS principal_id, installable_id, permissions \
                   FROM installable_group_permissions WHERE installable_id = $1 ORDER BY id",
            upsert: "INSERT INTO installable_group_permissions (group_id, installable_id, permissions) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (group_id, installable_id) DO UPDATE SET permissions = EXCLUDED.permissions \
                     RETURNING id, group_id AS principal_id, installable_id, permissions",
            delete: "DELETE FROM installable_group_permissions WHERE id = $1 AND installable_id = $2",
            delete_principal: "DELETE FROM installable_group_permissions WHERE group_id = $1",
            delete_installable: "DELETE FROM installable_group_permissions WHERE installable_id = $1",
        },
    }
}

struct GrantSql {
    list: &'static str,
    upsert: &'static str,
    delete: &'static str,
    delete_principal: &'static str,
    delete_installable: &'static str,
}

const PRINCIPAL_KINDS: [PrincipalKind; 2] = [PrincipalKind::User, PrincipalKind::Group];

impl PostgresTx {
    async fn rows<T>(&mut self, sql: &str, id: Option<i64>) -> StoreResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut query = sqlx::query_as::<_, T>(sql);
        if let Some(id) = id {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&mut *self.tx).await?)
    }

    async fn links(
        &mut self,
        link: &LinkTable,
        owner: Option<i64>,
    ) -> StoreResult<HashMap<i64, Vec<i64>>> {
        let sql = link.select_sql(owner.is_some());
        let rows = self.rows::<DbLink>(&sql, owner).await?;
        Ok(group_links(rows))
    }

    /// Records of `entity`, all of them or the one with `id`.
    async fn fetch(
        &mut self,
        entity: EntityType,
        id: Option<i64>,
        lock: LockMode,
    ) -> StoreResult<Vec<Record>> {
        let sql = select_sql(entity, id.is_some(), lock);
        let records: Vec<Record> = match entity {
            EntityType::User => self
                .rows::<DbUser>(&sql, id)
                .await?
                .into_iter()
                .map(|row| Record::User(user_from_db(row)))
                .collect(),
            EntityType::Group => self
                .rows::<DbGroup>(&sql, id)
                .await?
                .into_iter()
                .map(|row| {
                    Record::Group(Group {
                        id: row.id,
                        display_name: row.display_name,
                        api_key: row.api_key,
                        description: row.description,
                        website: row.website,
                        gpg_pubkey_id: row.gpg_pubkey_id,
                    })
                })
                .collect(),
            EntityType::Installable => {
                let rows = self.rows::<DbInstallable>(&sql, id).await?;
                let mut links = Links {
                    tags: self.links(&INSTALLABLE_TAGS, id).await?,
                    revisions: self.links(&INSTALLABLE_REVISIONS, id).await?,
                };
                rows.into_iter()
                    .map(|row| installable_from_db(row, &mut links).map(Record::Installable))
                    .collect::<StoreResult<Vec<_>>>()?
            }
            EntityType::Tag => self
                .rows::<DbTag>(&sql, id)
                .await?
                .into_iter()
                .map(|row| {
                    Record::Tag(Tag {
                        id: row.id,
                        display_name: row.display_name,
                        description: row.description,
                    })
                })
                .collect(),
            EntityType::Revision => self
                .rows::<DbRevision>(&sql, id)
                .await?
                .into_iter()
                .map(|row| {
                    Record::Revision(Revision {
                        id: row.id,
                        version: row.version,
                        commit_message: row.commit_message,
                        public: row.public,
                        uploaded: row.uploaded,
                        tar_gz_sha256: row.tar_gz_sha256,
                        tar_gz_sig_available: row.tar_gz_sig_available,
                        replacement_revision: row.replacement_revision,
                    })
                })
                .collect(),
            EntityType::SuiteRevision => {
                let rows = self.rows::<DbSuiteRevision>(&sql, id).await?;
                let mut contained = self.links(&SUITE_REVISION_REVISIONS, id).await?;
                rows.into_iter()
                    .map(|row| {
                        Record::SuiteRevision(SuiteRevision {
                            id: row.id,
                            version: row.version,
                            commit_message: row.commit_message,
                            installable: row.installable_id,
                            contained_revision_ids: contained.remove(&row.id).unwrap_or_default(),
                        })
                    })
                    .collect()
            }
        };
        Ok(records)
    }

    /// Bind `record`'s columns in [`columns`] order and run `sql`.
    async fn write_row(&mut self, record: &Record, sql: &str) -> StoreResult<u64> {
        let query = sqlx::query(sql).bind(record.id());
        let query = match record {
            Record::User(user) => query
                .bind(&user.display_name)
                .bind(&user.email)
                .bind(&user.api_key)
                .bind(&user.gpg_pubkey_id),
            Record::Group(group) => query
                .bind(&group.display_name)
                .bind(&group.api_key)
                .bind(&group.description)
                .bind(&group.website)
                .bind(&group.gpg_pubkey_id),
            Record::Installable(installable) => query
                .bind(&installable.name)
                .bind(&installable.description)
                .bind(&installable.remote_repository_url)
                .bind(&installable.homepage_url)
                .bind(installable.repository_type.as_str()),
            Record::Tag(tag) => query.bind(&tag.display_name).bind(&tag.description),
            Record::Revision(revision) => query
                .bind(&revision.version)
                .bind(&revision.commit_message)
                .bind(revision.public)
                .bind(revision.uploaded)
                .bind(&revision.tar_gz_sha256)
                .bind(revision.tar_gz_sig_available)
                .bind(revision.replacement_revision),
            Record::SuiteRevision(suite) => query
                .bind(&suite.version)
                .bind(&suite.commit_message)
                .bind(suite.installable),
        };
        Ok(query.execute(&mut *self.tx).await?.rows_affected())
    }

    async fn replace_links(&mut self, link: &LinkTable, owner: i64, linked: &[i64]) -> StoreResult<()> {
        sqlx::query(&link.delete_sql())
            .bind(owner)
            .execute(&mut *self.tx)
            .await?;
        if !linked.is_empty() {
            sqlx::query(&link.insert_sql())
                .bind(owner)
                .bind(linked)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn write_links(&mut self, record: &Record) -> StoreResult<()> {
        match record {
            Record::Installable(installable) => {
                self.replace_links(&INSTALLABLE_TAGS, installable.id, &installable.tag_ids)
                    .await?;
                self.replace_links(
                    &INSTALLABLE_REVISIONS,
                    installable.id,
                    &installable.revision_ids,
                )
                .await
            }
            Record::SuiteRevision(suite) => {
                self.replace_links(
                    &SUITE_REVISION_REVISIONS,
                    suite.id,
                    &suite.contained_revision_ids,
                )
                .await
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogTx for PostgresTx {
    async fn get(&mut self, entity: EntityType, id: i64) -> StoreResult<Option<Record>> {
        Ok(self
            .fetch(entity, Some(id), LockMode::Shared)
            .await?
            .into_iter()
            .next())
    }

    async fn list(&mut self, entity: EntityType, lock: LockMode) -> StoreResult<Vec<Record>> {
        self.fetch(entity, None, lock).await
    }

    async fn insert(&mut self, mut record: Record) -> StoreResult<Record> {
        let id: i64 = sqlx::query_scalar("SELECT nextval('catalog_record_ids')")
            .fetch_one(&mut *self.tx)
            .await?;
        record.set_id(id);
        self.write_row(&record, &insert_sql(record.entity())).await?;
        self.write_links(&record).await?;
        Ok(record)
    }

    async fn update(&mut self, record: Record) -> StoreResult<Record> {
        let updated = self
            .write_row(&record, &update_sql(record.entity()))
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(record.entity().as_str().to_string()));
        }
        self.write_links(&record).await?;
        Ok(record)
    }

    async fn remove(&mut self, entity: EntityType, id: i64) -> StoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", table(entity));
        let result = sqlx::query(&sql).bind(id).execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(entity.as_str().to_string()));
        }
        Ok(())
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE email = $1",
            columns(EntityType::User)
        );
        let row = sqlx::query_as::<_, DbUser>(&sql)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(user_from_db))
    }

    async fn installables_linking(
        &mut self,
        entity: EntityType,
        id: i64,
    ) -> StoreResult<Vec<i64>> {
        let link = match entity {
            EntityType::Tag => &INSTALLABLE_TAGS,
            EntityType::Revision => &INSTALLABLE_REVISIONS,
            _ => return Ok(Vec::new()),
        };
        let ids = sqlx::query_scalar::<_, i64>(&link.owners_sql())
            .bind(id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(ids)
    }

    async fn grants_on(&mut self, installable_id: i64) -> StoreResult<Vec<Grant>> {
        let mut grants = Vec::new();
        for kind in PRINCIPAL_KINDS {
            let rows = sqlx::query_as::<_, DbGrant>(grant_table_sql(kind).list)
                .bind(installable_id)
                .fetch_all(&mut *self.tx)
                .await?;
            grants.extend(rows.into_iter().map(|row| grant_from_db(kind, row)));
        }
        Ok(grants)
    }

    async fn upsert_grant(
        &mut self,
        kind: PrincipalKind,
        principal_id: i64,
        installable_id: i64,
        permissions: PermissionBits,
    ) -> StoreResult<Grant> {
        let row = sqlx::query_as::<_, DbGrant>(grant_table_sql(kind).upsert)
            .bind(principal_id)
            .bind(installable_id)
            .bind(permissions.to_db())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(grant_from_db(kind, row))
    }

    async fn delete_grant(
        &mut self,
        kind: PrincipalKind,
        installable_id: i64,
        grant_id: i64,
    ) -> StoreResult<()> {
        let result = sqlx::query(grant_table_sql(kind).delete)
            .bind(grant_id)
            .bind(installable_id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("grant".to_string()));
        }
        Ok(())
    }

    async fn delete_grants_of_principal(
        &mut self,
        kind: PrincipalKind,
        principal_id: i64,
    ) -> StoreResult<u64> {
        let result = sqlx::query(grant_table_sql(kind).delete_principal)
            .bind(principal_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_grants_on(&mut self, installable_id: i64) -> StoreResult<u64> {
        let mut removed = 0;
        for kind in PRINCIPAL_KINDS {
            let result = sqlx::query(grant_table_sql(kind).delete_installable)
                .bind(installable_id)
                .execute(&mut *self.tx)
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn grants_for(
        &mut self,
        user: UserId,
        installable_id: i64,
    ) -> StoreResult<PermissionBits> {
        let bits: i32 = sqlx::query_scalar(
            "SELECT COALESCE(BIT_OR(permissions), 0)::INTEGER FROM ( \
                 SELECT permissions FROM installable_user_permissions \
                 WHERE user_id = $1 AND installable_id = $2 \
                 UNION ALL \
                 SELECT gp.permissions FROM installable_group_permissions gp \
                 JOIN user_group_memberships m ON m.group_id = gp.group_id \
                 WHERE m.user_id = $1 AND gp.installable_id = $2 \
             ) AS effective",
        )
        .bind(user.get())
        .bind(installable_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(PermissionBits::from_db(bits))
    }

    async fn memberships_of(&mut self, group_id: i64) -> StoreResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, DbMembership>(
            "SELECT user_id, group_id, permissions FROM user_group_memberships \
             WHERE group_id = $1 ORDER BY user_id",
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(membership_from_db).collect())
    }

    async fn membership(
        &mut self,
        user: UserId,
        group_id: i64,
    ) -> StoreResult<Option<Membership>> {
        let row = sqlx::query_as::<_, DbMembership>(
            "SELECT user_id, group_id, permissions FROM user_group_memberships \
             WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(membership_from_db))
    }

    async fn upsert_membership(&mut self, membership: Membership) -> StoreResult<Membership> {
        let row = sqlx::query_as::<_, DbMembership>(
            "INSERT INTO user_group_memberships (user_id, group_id, permissions) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (group_id, user_id) DO UPDATE SET permissions = EXCLUDED.permissions \
             RETURNING user_id, group_id, permissions",
        )
        .bind(membership.user_id)
        .bind(membership.group_id)
        .bind(membership.permissions.to_db())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(membership_from_db(row))
    }

    async fn delete_membership(&mut self, group_id: i64, user_id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            "DELETE FROM user_group_memberships WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("membership".to_string()));
        }
        Ok(())
    }

    async fn delete_memberships_of(&mut self, kind: PrincipalKind, id: i64) -> StoreResult<u64> {
        let sql = match kind {
            PrincipalKind::User => "DELETE FROM user_group_memberships WHERE user_id = $1",
            PrincipalKind::Group => "DELETE FROM user_group_memberships WHERE group_id = $1",
        };
        let result = sqlx::query(sql).bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// SQLSTATE codes that mean "try again": serialization failure and deadlock.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn unique_conflict(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => "email already registered",
        Some("users_api_key_key" | "groups_api_key_key") => "api_key already in use",
        _ => "unique constraint",
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let (code, constraint) = match &err {
            sqlx::Error::Database(db_err) => (
                db_err.code().map(|code| code.into_owned()),
                db_err.constraint().map(str::to_owned),
            ),
            _ => (None, None),
        };
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound("row".to_string());
        }
        let transient = matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) || code
            .as_deref()
            .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&code));
        if transient {
            return StoreError::Transient(err.to_string());
        }
        match code.as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return StoreError::Conflict(unique_conflict(constraint.as_deref()).to_string());
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                return StoreError::Conflict("referenced record does not exist".to_string());
            }
            _ => {}
        }
        StoreError::Unexpected(err.into())
    }
}
