use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{self, ItemScope, MonetaryAggregate};
use crate::cascade;
use crate::error::{AppError, AppResult};
use crate::id::new_uuid_v7;
use crate::identity::Identity;
use crate::images::{self, PendingImage, ROOM_IMAGE_SLOT};
use crate::model::{Attributes, Dwelling, Room, ATTR_UPDATED_AT};
use crate::state::AppState;
use crate::store::{self, EntityStore, Visibility};
use crate::time::now_ms;
use crate::validate;

const MSG_CREATE_FIELDS: &str = "dwelling_id, name and type are required";
const MSG_ELEMENT_FIELDS: &str = "name and type are required";
const MSG_EMPTY_BATCH: &str = "rooms must not be empty";
const MSG_NO_UPDATE_FIELDS: &str = "at least one room attribute is required";
const MSG_INVALID_DWELLING: &str = "invalid dwelling id";
const MSG_DWELLING_PARAM: &str = "dwelling_id is required";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoom {
    #[serde(default, alias = "dwellingId")]
    pub dwelling_id: Option<String>,
    #[serde(default, alias = "roomName")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "roomType")]
    pub room_type: Option<String>,
    /// Inline base64 payload; the stored record carries the derived key.
    #[serde(default, alias = "roomImage")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRoom {
    #[serde(default, alias = "roomName")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "roomType")]
    pub room_type: Option<String>,
    #[serde(default, alias = "roomImage")]
    pub image: Option<String>,
}

/// One element of a batch create. The parent dwelling is named once on the
/// enclosing request, not per element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomElement {
    #[serde(default, alias = "roomName")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "roomType")]
    pub room_type: Option<String>,
    #[serde(default, alias = "roomImage")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchCreateRooms {
    #[serde(default, alias = "dwellingId")]
    pub dwelling_id: Option<String>,
    #[serde(default)]
    pub rooms: Vec<RoomElement>,
}

/// Room enriched with the aggregate of its active items.
#[derive(Debug, Clone, Serialize)]
pub struct RoomOverview {
    #[serde(flatten)]
    pub room: Room,
    #[serde(flatten)]
    pub totals: MonetaryAggregate,
}

fn build_room(
    caller: &Identity,
    dwelling_id: &str,
    name: Option<&str>,
    room_type: Option<&str>,
    message: &str,
) -> AppResult<Room> {
    let name = validate::required(name, message)?;
    let room_type = validate::required(room_type, message)?;
    let now = now_ms();
    Ok(Room {
        id: new_uuid_v7(),
        owner_id: caller.user_id.clone(),
        dwelling_id: dwelling_id.to_string(),
        name: name.to_string(),
        room_type: room_type.to_string(),
        image: None,
        protected: false,
        deleted: false,
        created_at: now,
        updated_at: now,
    })
}

/// Decode an inline payload and persist its key on the room, returning the
/// bytes still to be uploaded.
fn attach_image(room: &mut Room, payload: Option<&str>) -> AppResult<Vec<PendingImage>> {
    let Some(payload) = payload else {
        return Ok(Vec::new());
    };
    let pending = images::prepare(
        &room.owner_id,
        &room.id,
        ROOM_IMAGE_SLOT,
        payload,
        room.created_at,
    )?;
    room.image = Some(pending.key.clone());
    Ok(vec![pending])
}

async fn persist_room(
    state: &AppState,
    room: Room,
    pending: Vec<PendingImage>,
) -> AppResult<Room> {
    store::insert(state.store.as_ref(), &room).await?;
    images::store_pending(state.objects.as_ref(), &state.config, pending).await?;
    Ok(room)
}

async fn require_dwelling(state: &AppState, caller: &Identity, id: &str) -> AppResult<Dwelling> {
    let dwelling = store::load::<Dwelling>(state.store.as_ref(), id).await?;
    validate::require_parent(dwelling, caller, MSG_INVALID_DWELLING)
}

/// Rooms list by name, with the protected room sorted after the
/// user-created ones.
fn sort_rooms(mut rooms: Vec<Room>) -> Vec<Room> {
    rooms.sort_by(|a, b| a.name.cmp(&b.name));
    let (misc, mut sorted): (Vec<Room>, Vec<Room>) =
        rooms.into_iter().partition(|room| room.protected);
    sorted.extend(misc);
    sorted
}

async fn overview(store: &dyn EntityStore, room: Room) -> AppResult<RoomOverview> {
    let totals = aggregate::item_aggregate(store, ItemScope::Room(&room.id)).await?;
    Ok(RoomOverview { room, totals })
}

pub async fn room_create(state: &AppState, caller: &Identity, req: CreateRoom) -> AppResult<Room> {
    let dwelling_id = validate::required(req.dwelling_id.as_deref(), MSG_CREATE_FIELDS)?;
    let mut room = build_room(
        caller,
        dwelling_id,
        req.name.as_deref(),
        req.room_type.as_deref(),
        MSG_CREATE_FIELDS,
    )?;
    require_dwelling(state, caller, dwelling_id).await?;

    let pending = attach_image(&mut room, req.image.as_deref())?;
    let room = persist_room(state, room, pending).await?;
    info!(room_id = %room.id, dwelling_id = %room.dwelling_id, "room created");
    Ok(room)
}

/// Batch create under one dwelling. Every element is validated and decoded
/// before any write, then the creates fan out concurrently.
pub async fn room_batch_create(
    state: &AppState,
    caller: &Identity,
    req: BatchCreateRooms,
) -> AppResult<Vec<Room>> {
    let dwelling_id = validate::required(req.dwelling_id.as_deref(), MSG_DWELLING_PARAM)?;
    validate::required_batch(&req.rooms, MSG_EMPTY_BATCH)?;

    let mut prepared = Vec::with_capacity(req.rooms.len());
    for element in &req.rooms {
        let mut room = build_room(
            caller,
            dwelling_id,
            element.name.as_deref(),
            element.room_type.as_deref(),
            MSG_ELEMENT_FIELDS,
        )?;
        let pending = attach_image(&mut room, element.image.as_deref())?;
        prepared.push((room, pending));
    }
    require_dwelling(state, caller, dwelling_id).await?;

    let mut creates = Vec::with_capacity(prepared.len());
    for (room, pending) in prepared {
        creates.push(persist_room(state, room, pending));
    }
    let rooms = try_join_all(creates).await?;

    info!(count = rooms.len(), dwelling_id = %dwelling_id, "rooms batch created");
    Ok(rooms)
}

pub async fn room_get(state: &AppState, caller: &Identity, id: &str) -> AppResult<RoomOverview> {
    let room = store::load::<Room>(state.store.as_ref(), id).await?;
    let room = validate::require_owned(room, caller)?;
    overview(state.store.as_ref(), room).await
}

/// Active rooms of one dwelling, enriched concurrently, with the protected
/// room sorted last.
pub async fn room_list(
    state: &AppState,
    caller: &Identity,
    dwelling_id: Option<&str>,
) -> AppResult<Vec<RoomOverview>> {
    let dwelling_id = dwelling_id
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request(MSG_DWELLING_PARAM))?;

    let rooms: Vec<Room> =
        store::list_children(state.store.as_ref(), dwelling_id, Visibility::Active).await?;
    let rooms = sort_rooms(
        rooms
            .into_iter()
            .filter(|room| room.owner_id == caller.user_id)
            .collect(),
    );

    let mut lookups = Vec::with_capacity(rooms.len());
    for room in rooms {
        lookups.push(overview(state.store.as_ref(), room));
    }
    try_join_all(lookups).await
}

pub async fn room_update(
    state: &AppState,
    caller: &Identity,
    id: &str,
    req: UpdateRoom,
) -> AppResult<Room> {
    if req.name.is_none() && req.room_type.is_none() && req.image.is_none() {
        return Err(AppError::validation(MSG_NO_UPDATE_FIELDS));
    }
    let room = store::load::<Room>(state.store.as_ref(), id).await?;
    let room = validate::require_owned(room, caller)?;
    validate::require_unprotected(&room, "updated")?;

    let now = now_ms();
    let mut patch = Attributes::new();
    if let Some(name) = &req.name {
        patch.insert("name".into(), name.clone().into());
    }
    if let Some(room_type) = &req.room_type {
        patch.insert("type".into(), room_type.clone().into());
    }
    let mut pending = Vec::new();
    if let Some(payload) = req.image.as_deref() {
        let image = images::prepare(&room.owner_id, &room.id, ROOM_IMAGE_SLOT, payload, now)?;
        patch.insert("image".into(), image.key.clone().into());
        pending.push(image);
    }
    patch.insert(ATTR_UPDATED_AT.into(), now.into());

    let updated = store::patch(state.store.as_ref(), &room.id, patch).await?;
    images::store_pending(state.objects.as_ref(), &state.config, pending).await?;
    Ok(updated)
}

/// Soft delete. Items under the room stay active; they drop out of dwelling
/// aggregates because those resolve through active rooms only.
pub async fn room_delete(state: &AppState, caller: &Identity, id: &str) -> AppResult<Room> {
    let room = store::load::<Room>(state.store.as_ref(), id).await?;
    let room = validate::require_owned(room, caller)?;
    validate::require_unprotected(&room, "deleted")?;
    let deleted = store::patch(state.store.as_ref(), &room.id, cascade::deletion_patch()).await?;
    info!(room_id = %room.id, "room deleted");
    Ok(deleted)
}
