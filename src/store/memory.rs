use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::model::{Attributes, EntityKind};

use super::{
    attr_str, is_deleted, require_id, ChangeListener, ChangeRecord, EntityStore, PutCondition,
    QueryKey, StoreError, Visibility,
};

/// In-memory entity store for tests and demos. Records live in a BTreeMap
/// per kind, so every query and scan iterates in ascending id order.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<EntityKind, BTreeMap<String, Attributes>>>,
    listener: Option<Arc<dyn ChangeListener>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: Arc<dyn ChangeListener>) -> Self {
        MemoryStore {
            records: RwLock::new(HashMap::new()),
            listener: Some(listener),
        }
    }

    fn emit(&self, change: ChangeRecord) {
        if let Some(listener) = &self.listener {
            listener.notify(change);
        }
    }

    fn key_matches(attrs: &Attributes, kind: EntityKind, key: QueryKey<'_>) -> Result<bool, StoreError> {
        match key {
            QueryKey::Owner(owner) => {
                Ok(attr_str(attrs, crate::model::ATTR_OWNER_ID) == Some(owner))
            }
            QueryKey::Parent(parent) => {
                let attr = kind.parent_attr().ok_or(StoreError::UnsupportedIndex {
                    kind,
                    index: "parent",
                })?;
                Ok(attr_str(attrs, attr) == Some(parent))
            }
        }
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Attributes>, StoreError> {
        let guard = self.records.read().expect("memory store lock");
        Ok(guard.get(&kind).and_then(|map| map.get(id)).cloned())
    }

    async fn batch_get(
        &self,
        kind: EntityKind,
        ids: &[String],
    ) -> Result<Vec<Attributes>, StoreError> {
        let guard = self.records.read().expect("memory store lock");
        let map = guard.get(&kind);
        Ok(ids
            .iter()
            .filter_map(|id| map.and_then(|m| m.get(id)).cloned())
            .collect())
    }

    async fn query(
        &self,
        kind: EntityKind,
        key: QueryKey<'_>,
        vis: Visibility,
    ) -> Result<Vec<Attributes>, StoreError> {
        let guard = self.records.read().expect("memory store lock");
        let mut rows = Vec::new();
        if let Some(map) = guard.get(&kind) {
            for attrs in map.values() {
                if !Self::key_matches(attrs, kind, key)? {
                    continue;
                }
                if vis.includes(is_deleted(attrs)) {
                    rows.push(attrs.clone());
                }
            }
        }
        Ok(rows)
    }

    async fn scan(
        &self,
        kind: EntityKind,
        vis: Visibility,
    ) -> Result<Vec<Attributes>, StoreError> {
        let guard = self.records.read().expect("memory store lock");
        let mut rows = Vec::new();
        if let Some(map) = guard.get(&kind) {
            for attrs in map.values() {
                if vis.includes(is_deleted(attrs)) {
                    rows.push(attrs.clone());
                }
            }
        }
        Ok(rows)
    }

    async fn put(
        &self,
        kind: EntityKind,
        attrs: Attributes,
        cond: PutCondition,
    ) -> Result<(), StoreError> {
        let id = require_id(kind, &attrs)?;
        {
            let mut guard = self.records.write().expect("memory store lock");
            let map = guard.entry(kind).or_default();
            if cond == PutCondition::IfAbsent && map.contains_key(&id) {
                return Err(StoreError::Conflict { kind, id });
            }
            map.insert(id.clone(), attrs.clone());
        }
        self.emit(ChangeRecord {
            kind,
            id,
            new_image: Some(attrs),
        });
        Ok(())
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: Attributes,
    ) -> Result<Attributes, StoreError> {
        let merged = {
            let mut guard = self.records.write().expect("memory store lock");
            let map = guard.entry(kind).or_default();
            let attrs = map.get_mut(id).ok_or_else(|| StoreError::Missing {
                kind,
                id: id.to_string(),
            })?;
            for (key, value) in patch {
                attrs.insert(key, value);
            }
            attrs.clone()
        };
        self.emit(ChangeRecord {
            kind,
            id: id.to_string(),
            new_image: Some(merged.clone()),
        });
        Ok(merged)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut guard = self.records.write().expect("memory store lock");
            guard
                .get_mut(&kind)
                .and_then(|map| map.remove(id))
                .is_some()
        };
        if removed {
            self.emit(ChangeRecord {
                kind,
                id: id.to_string(),
                new_image: None,
            });
        }
        Ok(())
    }
}
