use super::Model;
use super::record::Record;
use crate::connection::Connection;
use crate::core::{Error, Result};
use crate::policy::WrapPolicy;
use crate::runner::{Hooks, TransactionRunner};
use crate::storage::Session;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;

/// One model instance bound to a connection.
///
/// Writes (`save`, `update`, `delete`, `force_delete`, `restore`) run inside
/// a transaction while the entity's [`WrapPolicy`] says so, and directly on
/// the connection otherwise. They always use a single attempt.
///
/// An entity is driven by one logical operation at a time. Two tasks
/// overriding the wrap policy of the same instance race on the flag.
#[derive(Clone)]
pub struct Entity<M: Model, C: Connection = Session> {
    key: String,
    attributes: M,
    exists: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    policy: WrapPolicy,
    conn: C,
}

impl<M: Model, C: Connection> std::fmt::Debug for Entity<M, C>
where
    M: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("table", &M::TABLE)
            .field("key", &self.key)
            .field("attributes", &self.attributes)
            .field("exists", &self.exists)
            .field("deleted_at", &self.deleted_at)
            .field("wrap", &self.policy.should_wrap())
            .finish()
    }
}

impl<M: Model, C: Connection> Entity<M, C> {
    /// Unsaved entity with a fresh v4 key
    pub fn new(conn: C, attributes: M) -> Self {
        Self::with_key(conn, uuid::Uuid::new_v4().to_string(), attributes)
    }

    /// Unsaved entity with an explicit key
    pub fn with_key(conn: C, key: impl Into<String>, attributes: M) -> Self {
        Self {
            key: key.into(),
            attributes,
            exists: false,
            created_at: None,
            updated_at: None,
            deleted_at: None,
            policy: WrapPolicy::new(M::wrap_by_default()),
            conn,
        }
    }

    /// Replaces the wrap policy, e.g. one built from configuration.
    pub fn with_policy(mut self, policy: WrapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fills a new entity from `attrs` and saves it.
    pub async fn create(conn: C, attrs: Value) -> Result<Self> {
        let mut entity = Self::new(conn, M::default());
        entity.fill(attrs)?;
        entity.save().await?;
        Ok(entity)
    }

    /// Loads a live (not soft-deleted) entity.
    pub async fn find(conn: C, key: &str) -> Result<Option<Self>> {
        Ok(Self::find_with_trashed(conn, key)
            .await?
            .filter(|entity| !entity.trashed()))
    }

    pub async fn find_with_trashed(conn: C, key: &str) -> Result<Option<Self>> {
        let Some(row) = conn.fetch(M::TABLE, key).await? else {
            return Ok(None);
        };
        let record: Record<M> = serde_json::from_value(row)?;
        Ok(Some(Self::from_record(conn, key.to_string(), record)))
    }

    /// All live entities of the table, ordered by key.
    pub async fn all(conn: C) -> Result<Vec<Self>> {
        let mut entities = Vec::new();
        for (key, row) in conn.scan(M::TABLE).await? {
            let record: Record<M> = serde_json::from_value(row)?;
            if record.deleted_at.is_none() {
                entities.push(Self::from_record(conn.clone(), key, record));
            }
        }
        Ok(entities)
    }

    fn from_record(conn: C, key: String, record: Record<M>) -> Self {
        let mut entity = Self::with_key(conn, key, record.attributes);
        entity.exists = true;
        entity.created_at = record.created_at;
        entity.updated_at = record.updated_at;
        entity.deleted_at = record.deleted_at;
        entity
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn attributes(&self) -> &M {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut M {
        &mut self.attributes
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn policy(&self) -> &WrapPolicy {
        &self.policy
    }

    /// Whether the next write on this entity will be transaction-wrapped.
    pub fn should_wrap(&self) -> bool {
        self.policy.should_wrap()
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Merges the fields of the JSON object `attrs` into the attributes.
    pub fn fill(&mut self, attrs: Value) -> Result<()> {
        let Value::Object(patch) = attrs else {
            return Err(Error::PolicyViolation(
                "attributes must be a JSON object".into(),
            ));
        };

        let mut current = serde_json::to_value(&self.attributes)?;
        let Value::Object(fields) = &mut current else {
            return Err(Error::PolicyViolation(format!(
                "model for '{}' does not serialize to an object",
                M::TABLE
            )));
        };
        fields.extend(patch);

        self.attributes = serde_json::from_value(current)?;
        Ok(())
    }

    /// Fills an existing entity and saves it.
    pub async fn update(&mut self, attrs: Value) -> Result<()> {
        if !self.exists {
            return Err(self.not_found());
        }
        self.fill(attrs)?;
        self.save().await
    }

    /// Inserts a new row or overwrites the existing one.
    pub async fn save(&mut self) -> Result<()> {
        let now = Utc::now();
        let record = Record {
            attributes: self.attributes.clone(),
            created_at: self.created_at.or(Some(now)),
            updated_at: Some(now),
            deleted_at: self.deleted_at,
        };
        let row = serde_json::to_value(&record)?;
        let key = self.key.clone();
        let exists = self.exists;

        self.dispatch(move |conn: C| {
            let row = row.clone();
            let key = key.clone();
            async move {
                if exists {
                    conn.upsert(M::TABLE, &key, row).await
                } else {
                    conn.insert(M::TABLE, &key, row).await
                }
            }
        })
        .await?;

        self.exists = true;
        self.created_at = record.created_at;
        self.updated_at = record.updated_at;
        Ok(())
    }

    /// Soft-deletes when the model supports it, removes the row otherwise.
    ///
    /// Returns `false` when there was nothing to delete.
    pub async fn delete(&mut self) -> Result<bool> {
        if !self.exists {
            return Ok(false);
        }
        if !M::SOFT_DELETES {
            return self.force_delete().await;
        }
        if self.trashed() {
            return Ok(false);
        }

        let deleted_at = Utc::now();
        self.write_deleted_at(Some(deleted_at)).await?;
        Ok(true)
    }

    /// Removes the row, soft deletes or not.
    pub async fn force_delete(&mut self) -> Result<bool> {
        if !self.exists {
            return Ok(false);
        }

        let key = self.key.clone();
        let removed = self
            .dispatch(move |conn: C| {
                let key = key.clone();
                async move { conn.remove(M::TABLE, &key).await }
            })
            .await?;

        self.exists = false;
        self.deleted_at = None;
        Ok(removed)
    }

    /// Clears `deleted_at` on a soft-deleted entity.
    pub async fn restore(&mut self) -> Result<()> {
        if !M::SOFT_DELETES {
            return Err(Error::PolicyViolation(format!(
                "'{}' does not use soft deletes",
                M::TABLE
            )));
        }
        if !self.exists {
            return Err(self.not_found());
        }

        self.write_deleted_at(None).await
    }

    /// Reloads attributes and timestamps from the connection.
    pub async fn refresh(&mut self) -> Result<()> {
        let Some(row) = self.conn.fetch(M::TABLE, &self.key).await? else {
            self.exists = false;
            return Err(self.not_found());
        };
        let record: Record<M> = serde_json::from_value(row)?;
        self.attributes = record.attributes;
        self.created_at = record.created_at;
        self.updated_at = record.updated_at;
        self.deleted_at = record.deleted_at;
        self.exists = true;
        Ok(())
    }

    /// Runs `callback` with wrapping disabled; the previous flag comes back
    /// when it finishes, fails, or is dropped.
    pub async fn without_transaction<T, F>(&mut self, callback: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, Result<T>>,
    {
        let _restore = self.policy.scoped(false);
        callback(self).await
    }

    /// Runs `callback` inside one transaction with wrapping forced on.
    ///
    /// For the duration of the callback the entity's connection is bound to
    /// that transaction, so the entity's own writes join it. The original
    /// connection comes back when the callback finishes, fails, or is
    /// dropped.
    pub async fn with_forced_transaction<T, F>(&mut self, callback: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, Result<T>> + Send,
    {
        let _restore = self.policy.scoped(true);
        let wrapped = self.policy.should_wrap();
        let conn = self.conn.clone();

        let mut pending = Some((self, callback));
        TransactionRunner::run(
            &conn,
            move |tx: C| {
                let taken = pending.take();
                async move {
                    let Some((this, callback)) = taken else {
                        return Err(Error::PolicyViolation(
                            "forced transaction callback can only run once".into(),
                        ));
                    };
                    let swap = ConnectionSwap::bind(this, tx);
                    callback(&mut *swap.entity).await
                }
            },
            wrapped,
            1,
            Hooks::none(),
        )
        .await
    }

    /// Class-level entry point: runs `op` wrapped or not according to
    /// [`Model::wrap_by_default`].
    pub async fn with_transaction<T, F, Fut>(conn: &C, op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(C) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        TransactionRunner::run(conn, op, M::wrap_by_default(), 1, Hooks::none()).await
    }

    /// Same as [`Entity::with_transaction`].
    pub async fn transactional<T, F, Fut>(conn: &C, op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(C) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        Self::with_transaction(conn, op).await
    }

    async fn write_deleted_at(&mut self, deleted_at: Option<DateTime<Utc>>) -> Result<()> {
        let now = Utc::now();
        let record = Record {
            attributes: self.attributes.clone(),
            created_at: self.created_at,
            updated_at: Some(now),
            deleted_at,
        };
        let row = serde_json::to_value(&record)?;
        let key = self.key.clone();

        self.dispatch(move |conn: C| {
            let row = row.clone();
            let key = key.clone();
            async move { conn.upsert(M::TABLE, &key, row).await }
        })
        .await?;

        self.updated_at = record.updated_at;
        self.deleted_at = deleted_at;
        Ok(())
    }

    async fn dispatch<T, F, Fut>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(C) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        TransactionRunner::run(&self.conn, op, self.policy.should_wrap(), 1, Hooks::none()).await
    }

    fn not_found(&self) -> Error {
        Error::NotFound {
            table: M::TABLE.to_string(),
            key: self.key.clone(),
        }
    }
}

/// Holds an entity bound to a transaction handle; puts the original
/// connection back on drop.
struct ConnectionSwap<'e, M: Model, C: Connection> {
    entity: &'e mut Entity<M, C>,
    outer: Option<C>,
}

impl<'e, M: Model, C: Connection> ConnectionSwap<'e, M, C> {
    fn bind(entity: &'e mut Entity<M, C>, tx: C) -> Self {
        let outer = std::mem::replace(&mut entity.conn, tx);
        Self {
            entity,
            outer: Some(outer),
        }
    }
}

impl<M: Model, C: Connection> Drop for ConnectionSwap<'_, M, C> {
    fn drop(&mut self) {
        if let Some(outer) = self.outer.take() {
            self.entity.conn = outer;
        }
    }
}
