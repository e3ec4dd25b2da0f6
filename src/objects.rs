use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object store error: {0}")]
    Backend(String),
    #[error("object {0} not found")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
}

/// Raw byte storage for image payloads. Keys are flat strings with `/`
/// separators, prefix conventions live in [`crate::config::AppConfig`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectError>;
}

/// Object-created notification, the trigger for thumbnail derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub key: String,
}

pub trait ObjectListener: Send + Sync {
    fn object_created(&self, event: ObjectEvent);
}

/// Queues object-created events for later draining, standing in for the
/// storage service's bucket notifications in tests.
#[derive(Debug, Default)]
pub struct ObjectEventBuffer {
    events: Mutex<Vec<ObjectEvent>>,
}

impl ObjectEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<ObjectEvent> {
        std::mem::take(&mut *self.events.lock().expect("object event lock"))
    }
}

impl ObjectListener for ObjectEventBuffer {
    fn object_created(&self, event: ObjectEvent) {
        self.events.lock().expect("object event lock").push(event);
    }
}

/// In-memory object store for tests and demos.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    listener: Option<Arc<dyn ObjectListener>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: Arc<dyn ObjectListener>) -> Self {
        MemoryObjectStore {
            objects: RwLock::new(BTreeMap::new()),
            listener: Some(listener),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .expect("object store lock")
            .contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("object store lock")
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectError> {
        check_key(key)?;
        self.objects
            .write()
            .expect("object store lock")
            .insert(key.to_string(), bytes);
        if let Some(listener) = &self.listener {
            listener.object_created(ObjectEvent {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectError> {
        self.objects
            .read()
            .expect("object store lock")
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectError::NotFound(key.to_string()))
    }
}

/// Filesystem-backed object store. Keys map to paths under the root; no
/// event emission, deployments wire notifications at the storage service.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsObjectStore { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

fn check_key(key: &str) -> Result<(), ObjectError> {
    if key.is_empty() {
        return Err(ObjectError::InvalidKey("empty key".into()));
    }
    let path = Path::new(key);
    let traversal = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if traversal {
        return Err(ObjectError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectError::Backend(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ObjectError::Backend(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectError::NotFound(key.to_string()))
            }
            Err(e) => Err(ObjectError::Backend(e.to_string())),
        }
    }
}
