use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::identity::{IdentityDirectory, MemoryDirectory};
use crate::index::{MemoryIndex, SearchIndex};
use crate::objects::{FsObjectStore, MemoryObjectStore, ObjectEventBuffer, ObjectStore};
use crate::store::memory::MemoryStore;
use crate::store::sqlite::SqliteStore;
use crate::store::{ChangeBuffer, EntityStore};
use crate::sync::{self, SyncSummary};
use crate::thumbnails;

/// Everything a request handler needs, plus the buffers that stand in for
/// the store and object-storage triggers. Mutations land in the buffers and
/// stay there until a pump call drains them, so index and thumbnail work
/// happens outside the request that caused it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub index: Arc<dyn SearchIndex>,
    pub objects: Arc<dyn ObjectStore>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub config: AppConfig,
    changes: Arc<ChangeBuffer>,
    object_events: Arc<ObjectEventBuffer>,
}

impl AppState {
    pub fn in_memory() -> Self {
        Self::in_memory_with_config(AppConfig::default())
    }

    pub fn in_memory_with_config(config: AppConfig) -> Self {
        let changes = Arc::new(ChangeBuffer::new());
        let object_events = Arc::new(ObjectEventBuffer::new());
        AppState {
            store: Arc::new(MemoryStore::with_listener(changes.clone())),
            index: Arc::new(MemoryIndex::new()),
            objects: Arc::new(MemoryObjectStore::with_listener(object_events.clone())),
            directory: Arc::new(MemoryDirectory::new()),
            config,
            changes,
            object_events,
        }
    }

    /// Durable variant: records in SQLite, objects on disk. The index stays
    /// in memory and is rebuilt by replaying changes.
    pub async fn with_sqlite(
        pool: SqlitePool,
        objects_root: impl Into<PathBuf>,
        config: AppConfig,
    ) -> AppResult<Self> {
        let changes = Arc::new(ChangeBuffer::new());
        let store = SqliteStore::open(pool).await?.with_listener(changes.clone());
        Ok(AppState {
            store: Arc::new(store),
            index: Arc::new(MemoryIndex::new()),
            objects: Arc::new(FsObjectStore::new(objects_root)),
            directory: Arc::new(MemoryDirectory::new()),
            config,
            changes,
            object_events: Arc::new(ObjectEventBuffer::new()),
        })
    }

    pub fn with_directory(mut self, directory: Arc<dyn IdentityDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    /// Drain buffered store mutations into the search index.
    pub async fn sync_search(&self) -> AppResult<SyncSummary> {
        let summary = sync::apply_changes(self.index.as_ref(), self.changes.drain()).await?;
        Ok(summary)
    }

    /// Drain buffered object-storage events through the thumbnail pipeline.
    /// Returns the number of events processed; failures are logged, not
    /// surfaced.
    pub async fn derive_thumbnails(&self) -> usize {
        let events = self.object_events.drain();
        let processed = events.len();
        for event in events {
            thumbnails::process_event(self.objects.as_ref(), &self.config, event).await;
        }
        processed
    }
}
