use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{from_attributes, to_attributes, Attributes, Entity, EntityKind, ATTR_DELETED};

pub(crate) mod memory;
pub(crate) mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Backend(String),
    #[error("{kind} record {id} is missing")]
    Missing { kind: EntityKind, id: String },
    #[error("{kind} record {id} already exists")]
    Conflict { kind: EntityKind, id: String },
    #[error("{kind} has no {index} index")]
    UnsupportedIndex {
        kind: EntityKind,
        index: &'static str,
    },
    #[error("malformed record: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Whether soft-deleted records are visible to a query or scan. Primary-key
/// gets ignore the flag entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Active,
    All,
}

impl Visibility {
    pub fn includes(self, deleted: bool) -> bool {
        matches!(self, Visibility::All) || !deleted
    }
}

/// Secondary-index key for [`EntityStore::query`].
#[derive(Debug, Clone, Copy)]
pub enum QueryKey<'a> {
    Owner(&'a str),
    Parent(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    Overwrite,
    IfAbsent,
}

/// One mutation as seen by the change-data-capture pipeline. `new_image`
/// is the post-mutation record, `None` when it was physically removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub kind: EntityKind,
    pub id: String,
    pub new_image: Option<Attributes>,
}

/// Receives every mutation a store performs, in commit order.
pub trait ChangeListener: Send + Sync {
    fn notify(&self, change: ChangeRecord);
}

/// Listener that queues changes for later draining, the test-side stand-in
/// for a stream trigger.
#[derive(Debug, Default)]
pub struct ChangeBuffer {
    changes: Mutex<Vec<ChangeRecord>>,
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<ChangeRecord> {
        std::mem::take(&mut *self.changes.lock().expect("change buffer lock"))
    }

    pub fn len(&self) -> usize {
        self.changes.lock().expect("change buffer lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeListener for ChangeBuffer {
    fn notify(&self, change: ChangeRecord) {
        self.changes.lock().expect("change buffer lock").push(change);
    }
}

/// Key-value contract every handler goes through. Implementations must keep
/// iteration order deterministic (this crate orders by id) so aggregate
/// carry-through behaves the same across stores.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Primary-key read; returns soft-deleted records too.
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Attributes>, StoreError>;

    /// Primary-key reads in input order; absent ids are skipped.
    async fn batch_get(
        &self,
        kind: EntityKind,
        ids: &[String],
    ) -> Result<Vec<Attributes>, StoreError>;

    async fn query(
        &self,
        kind: EntityKind,
        key: QueryKey<'_>,
        vis: Visibility,
    ) -> Result<Vec<Attributes>, StoreError>;

    async fn scan(&self, kind: EntityKind, vis: Visibility)
        -> Result<Vec<Attributes>, StoreError>;

    async fn put(
        &self,
        kind: EntityKind,
        attrs: Attributes,
        cond: PutCondition,
    ) -> Result<(), StoreError>;

    /// Partial attribute merge; returns the post-update image. Errors with
    /// [`StoreError::Missing`] when the record does not exist.
    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: Attributes,
    ) -> Result<Attributes, StoreError>;

    /// Physical removal. Removing an absent record is a no-op.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError>;
}

pub(crate) fn attr_str<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(|value| value.as_str())
}

pub(crate) fn attr_flag(attrs: &Attributes, key: &str) -> bool {
    match attrs.get(key) {
        Some(value) => value.as_bool().unwrap_or_else(|| {
            value.as_i64().map(|n| n != 0).unwrap_or(false)
        }),
        None => false,
    }
}

pub(crate) fn is_deleted(attrs: &Attributes) -> bool {
    attr_flag(attrs, ATTR_DELETED)
}

pub(crate) fn require_id(kind: EntityKind, attrs: &Attributes) -> Result<String, StoreError> {
    attr_str(attrs, crate::model::ATTR_ID)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Decode(format!("{kind} record without an id attribute")))
}

// Typed wrappers over the attribute-map contract.

pub async fn load<T: Entity>(store: &dyn EntityStore, id: &str) -> Result<Option<T>, StoreError> {
    match store.get(T::KIND, id).await? {
        Some(attrs) => Ok(Some(from_attributes(attrs)?)),
        None => Ok(None),
    }
}

pub async fn insert<T: Entity>(store: &dyn EntityStore, entity: &T) -> Result<(), StoreError> {
    let attrs = to_attributes(entity)?;
    store.put(T::KIND, attrs, PutCondition::IfAbsent).await
}

pub async fn patch<T: Entity>(
    store: &dyn EntityStore,
    id: &str,
    patch: Attributes,
) -> Result<T, StoreError> {
    let attrs = store.update(T::KIND, id, patch).await?;
    Ok(from_attributes(attrs)?)
}

pub async fn list_owned<T: Entity>(
    store: &dyn EntityStore,
    owner_id: &str,
    vis: Visibility,
) -> Result<Vec<T>, StoreError> {
    let rows = store.query(T::KIND, QueryKey::Owner(owner_id), vis).await?;
    decode_rows(rows)
}

pub async fn list_children<T: Entity>(
    store: &dyn EntityStore,
    parent_id: &str,
    vis: Visibility,
) -> Result<Vec<T>, StoreError> {
    let rows = store
        .query(T::KIND, QueryKey::Parent(parent_id), vis)
        .await?;
    decode_rows(rows)
}

pub async fn scan_all<T: Entity>(
    store: &dyn EntityStore,
    vis: Visibility,
) -> Result<Vec<T>, StoreError> {
    let rows = store.scan(T::KIND, vis).await?;
    decode_rows(rows)
}

fn decode_rows<T: Entity>(rows: Vec<Attributes>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|attrs| from_attributes(attrs).map_err(StoreError::from))
        .collect()
}
