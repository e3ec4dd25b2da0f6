use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::id::new_uuid_v7;
use crate::model::{
    Attributes, Dwelling, EntityKind, Room, ATTR_DELETED, ATTR_UPDATED_AT, MISC_ROOM_NAME,
};
use crate::store::{self, EntityStore, QueryKey, Visibility};
use crate::time::now_ms;

/// Patch applied to every record a soft delete touches.
pub fn deletion_patch() -> Attributes {
    let mut patch = Attributes::new();
    patch.insert(ATTR_DELETED.into(), true.into());
    patch.insert(ATTR_UPDATED_AT.into(), now_ms().into());
    patch
}

/// The protected room that accompanies every dwelling.
pub fn misc_room(owner_id: &str, dwelling_id: &str) -> Room {
    let now = now_ms();
    Room {
        id: new_uuid_v7(),
        owner_id: owner_id.to_string(),
        dwelling_id: dwelling_id.to_string(),
        name: MISC_ROOM_NAME.to_string(),
        room_type: MISC_ROOM_NAME.to_string(),
        image: None,
        protected: true,
        deleted: false,
        created_at: now,
        updated_at: now,
    }
}

/// Two-step compound create: the dwelling record, then its Misc room.
/// No transaction spans the two puts; a failure between them leaves the
/// dwelling without its protected room.
pub async fn create_dwelling_records(
    store: &dyn EntityStore,
    dwelling: &Dwelling,
) -> AppResult<Room> {
    store::insert(store, dwelling).await?;
    let room = misc_room(&dwelling.owner_id, &dwelling.id);
    store::insert(store, &room).await?;
    debug!(
        dwelling_id = %dwelling.id,
        room_id = %room.id,
        "created dwelling with its Misc room"
    );
    Ok(room)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub rooms: usize,
    pub items: usize,
}

/// Soft-delete every active record of `kind` the owner has, fanning the
/// per-record writes out concurrently.
async fn soft_delete_owned(
    store: &dyn EntityStore,
    kind: EntityKind,
    owner_id: &str,
) -> AppResult<usize> {
    let rows = store
        .query(kind, QueryKey::Owner(owner_id), Visibility::Active)
        .await?;
    let mut writes = Vec::with_capacity(rows.len());
    for row in &rows {
        let id = store::require_id(kind, row)?;
        writes.push(async move { store.update(kind, &id, deletion_patch()).await });
    }
    try_join_all(writes).await?;
    Ok(rows.len())
}

/// Dwelling soft delete: flag the dwelling itself, then run the room and
/// item cascades. Both cascades are owner-scoped and independent, so they
/// run concurrently.
pub async fn soft_delete_dwelling(
    store: &dyn EntityStore,
    dwelling: &Dwelling,
) -> AppResult<(Dwelling, CascadeSummary)> {
    let updated: Dwelling = store::patch(store, &dwelling.id, deletion_patch()).await?;
    let (rooms, items) = futures::try_join!(
        soft_delete_owned(store, EntityKind::Room, &dwelling.owner_id),
        soft_delete_owned(store, EntityKind::Item, &dwelling.owner_id),
    )?;
    let summary = CascadeSummary { rooms, items };
    info!(
        dwelling_id = %dwelling.id,
        rooms = summary.rooms,
        items = summary.items,
        "soft-deleted dwelling and cascaded"
    );
    Ok((updated, summary))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub dwellings: usize,
    pub rooms: usize,
    pub items: usize,
}

impl PurgeSummary {
    pub fn total(&self) -> usize {
        self.dwellings + self.rooms + self.items
    }
}

async fn purge_kind(
    store: &dyn EntityStore,
    kind: EntityKind,
    owner_id: &str,
) -> AppResult<usize> {
    let rows = store
        .query(kind, QueryKey::Owner(owner_id), Visibility::All)
        .await?;
    let mut removals = Vec::with_capacity(rows.len());
    for row in &rows {
        let id = store::require_id(kind, row)?;
        removals.push(async move { store.delete(kind, &id).await });
    }
    try_join_all(removals).await?;
    Ok(rows.len())
}

/// Physically remove every record the owner has, soft-deleted rows
/// included. Kinds are purged one after another, records within a kind
/// concurrently.
pub async fn purge_owned(store: &dyn EntityStore, owner_id: &str) -> AppResult<PurgeSummary> {
    let mut summary = PurgeSummary::default();
    for kind in EntityKind::ALL {
        let count = purge_kind(store, kind, owner_id).await?;
        match kind {
            EntityKind::Dwelling => summary.dwellings = count,
            EntityKind::Room => summary.rooms = count,
            EntityKind::Item => summary.items = count,
        }
    }
    info!(owner = %owner_id, total = summary.total(), "purged user data");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::PutCondition;
    use serde_json::json;

    fn dwelling(id: &str, owner: &str) -> Dwelling {
        Dwelling {
            id: id.into(),
            owner_id: owner.into(),
            name: "Home".into(),
            dwelling_type: "House".into(),
            address_line1: None,
            address_line2: None,
            city: None,
            post_code: None,
            deleted: false,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn deletion_patch_flags_and_stamps() {
        let patch = deletion_patch();
        assert_eq!(patch.get(ATTR_DELETED), Some(&json!(true)));
        assert!(patch.get(ATTR_UPDATED_AT).and_then(|v| v.as_i64()).is_some());
    }

    #[test]
    fn misc_room_is_protected() {
        let room = misc_room("u-1", "d-1");
        assert!(room.protected);
        assert_eq!(room.name, MISC_ROOM_NAME);
        assert_eq!(room.room_type, MISC_ROOM_NAME);
        assert_eq!(room.dwelling_id, "d-1");
    }

    #[tokio::test]
    async fn compound_create_writes_both_records() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let dwelling = dwelling("d-1", "u-1");
        let room = create_dwelling_records(&store, &dwelling).await?;
        assert!(store.get(EntityKind::Dwelling, "d-1").await?.is_some());
        let rooms = store
            .query(EntityKind::Room, QueryKey::Parent("d-1"), Visibility::Active)
            .await?;
        assert_eq!(rooms.len(), 1);
        assert_eq!(store::require_id(EntityKind::Room, &rooms[0])?, room.id);
        Ok(())
    }

    #[tokio::test]
    async fn cascade_soft_deletes_owned_rooms_and_items() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let home = dwelling("d-1", "u-1");
        create_dwelling_records(&store, &home).await?;

        let mut item = Attributes::new();
        item.insert("id".into(), json!("i-1"));
        item.insert("owner_id".into(), json!("u-1"));
        item.insert("room_id".into(), json!("r-any"));
        item.insert("description".into(), json!("Lamp"));
        store
            .put(EntityKind::Item, item, PutCondition::IfAbsent)
            .await?;

        let (updated, summary) = soft_delete_dwelling(&store, &home).await?;
        assert!(updated.deleted);
        assert_eq!(summary, CascadeSummary { rooms: 1, items: 1 });

        // soft-deleted rows stay retrievable by primary key
        assert!(store.get(EntityKind::Item, "i-1").await?.is_some());
        let active = store
            .query(EntityKind::Item, QueryKey::Owner("u-1"), Visibility::Active)
            .await?;
        assert!(active.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn purge_removes_soft_deleted_rows_too() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let home = dwelling("d-1", "u-1");
        create_dwelling_records(&store, &home).await?;
        soft_delete_dwelling(&store, &home).await?;

        let summary = purge_owned(&store, "u-1").await?;
        assert_eq!(summary.dwellings, 1);
        assert_eq!(summary.rooms, 1);
        assert_eq!(summary.total(), 2);
        assert!(store.get(EntityKind::Dwelling, "d-1").await?.is_none());
        assert!(store.get(EntityKind::Room, "d-1").await?.is_none());
        Ok(())
    }
}
