use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::cascade;
use crate::error::{AppError, AppResult};
use crate::id::new_uuid_v7;
use crate::identity::Identity;
use crate::images::{self, PendingImage, ITEM_IMAGE_SLOTS};
use crate::model::{Attributes, Item, Room, ATTR_UPDATED_AT};
use crate::state::AppState;
use crate::store::{self, Visibility};
use crate::time::now_ms;
use crate::validate;

const MSG_CREATE_FIELDS: &str = "room_id and description are required";
const MSG_ELEMENT_FIELDS: &str = "description is required";
const MSG_EMPTY_BATCH: &str = "items must not be empty";
const MSG_NO_UPDATE_FIELDS: &str = "at least one item attribute is required";
const MSG_INVALID_ROOM: &str = "invalid room id";
const MSG_ROOM_PARAM: &str = "room_id is required";

/// Writable item attributes, shared by create, batch elements and update.
/// `quantity` and `price` stay raw JSON values; aggregation coerces them.
/// The four image fields carry inline base64 payloads on requests, while the
/// stored record carries derived keys under the same names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPayload {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "serialNumber")]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub retailer: Option<String>,
    #[serde(default, alias = "purchaseDate")]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default, alias = "priceCurrency")]
    pub price_currency: Option<String>,
    #[serde(default, alias = "itemImageFull")]
    pub image_full: Option<String>,
    #[serde(default, alias = "receiptImgC")]
    pub receipt_image: Option<String>,
    #[serde(default, alias = "itemImage1")]
    pub image_1: Option<String>,
    #[serde(default, alias = "itemImage2")]
    pub image_2: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateItem {
    #[serde(default, alias = "roomId")]
    pub room_id: Option<String>,
    #[serde(flatten)]
    pub payload: ItemPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchCreateItems {
    #[serde(default, alias = "roomId")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemPayload>,
}

fn build_item(
    caller: &Identity,
    room_id: &str,
    payload: &ItemPayload,
    message: &str,
) -> AppResult<Item> {
    let description = validate::required(payload.description.as_deref(), message)?;
    let now = now_ms();
    Ok(Item {
        id: new_uuid_v7(),
        owner_id: caller.user_id.clone(),
        room_id: room_id.to_string(),
        description: description.to_string(),
        brand: payload.brand.clone(),
        model: payload.model.clone(),
        serial_number: payload.serial_number.clone(),
        quantity: payload.quantity.clone(),
        retailer: payload.retailer.clone(),
        purchase_date: payload.purchase_date.clone(),
        price: payload.price.clone(),
        price_currency: payload.price_currency.clone(),
        image_full: None,
        receipt_image: None,
        image_1: None,
        image_2: None,
        deleted: false,
        created_at: now,
        updated_at: now,
    })
}

/// Decode every present payload slot in fixed order and persist the derived
/// keys on the item, returning the bytes still to be uploaded.
fn attach_images(item: &mut Item, payload: &ItemPayload, now: i64) -> AppResult<Vec<PendingImage>> {
    let [slot_full, slot_receipt, slot_one, slot_two] = ITEM_IMAGE_SLOTS;
    let mut pending = Vec::new();
    if let Some(data) = payload.image_full.as_deref() {
        let image = images::prepare(&item.owner_id, &item.id, slot_full, data, now)?;
        item.image_full = Some(image.key.clone());
        pending.push(image);
    }
    if let Some(data) = payload.receipt_image.as_deref() {
        let image = images::prepare(&item.owner_id, &item.id, slot_receipt, data, now)?;
        item.receipt_image = Some(image.key.clone());
        pending.push(image);
    }
    if let Some(data) = payload.image_1.as_deref() {
        let image = images::prepare(&item.owner_id, &item.id, slot_one, data, now)?;
        item.image_1 = Some(image.key.clone());
        pending.push(image);
    }
    if let Some(data) = payload.image_2.as_deref() {
        let image = images::prepare(&item.owner_id, &item.id, slot_two, data, now)?;
        item.image_2 = Some(image.key.clone());
        pending.push(image);
    }
    Ok(pending)
}

fn update_patch(
    item_id: &str,
    owner_id: &str,
    req: &ItemPayload,
) -> AppResult<(Attributes, Vec<PendingImage>)> {
    let now = now_ms();
    let mut patch = Attributes::new();
    if let Some(description) = &req.description {
        patch.insert("description".into(), description.clone().into());
    }
    if let Some(brand) = &req.brand {
        patch.insert("brand".into(), brand.clone().into());
    }
    if let Some(model) = &req.model {
        patch.insert("model".into(), model.clone().into());
    }
    if let Some(serial_number) = &req.serial_number {
        patch.insert("serial_number".into(), serial_number.clone().into());
    }
    if let Some(quantity) = &req.quantity {
        patch.insert("quantity".into(), quantity.clone());
    }
    if let Some(retailer) = &req.retailer {
        patch.insert("retailer".into(), retailer.clone().into());
    }
    if let Some(purchase_date) = &req.purchase_date {
        patch.insert("purchase_date".into(), purchase_date.clone().into());
    }
    if let Some(price) = &req.price {
        patch.insert("price".into(), price.clone());
    }
    if let Some(price_currency) = &req.price_currency {
        patch.insert("price_currency".into(), price_currency.clone().into());
    }

    let [slot_full, slot_receipt, slot_one, slot_two] = ITEM_IMAGE_SLOTS;
    let mut pending = Vec::new();
    let slots = [
        (slot_full, req.image_full.as_deref()),
        (slot_receipt, req.receipt_image.as_deref()),
        (slot_one, req.image_1.as_deref()),
        (slot_two, req.image_2.as_deref()),
    ];
    for (slot, data) in slots {
        let Some(data) = data else {
            continue;
        };
        let image = images::prepare(owner_id, item_id, slot, data, now)?;
        patch.insert(slot.into(), image.key.clone().into());
        pending.push(image);
    }

    if patch.is_empty() {
        return Err(AppError::validation(MSG_NO_UPDATE_FIELDS));
    }
    patch.insert(ATTR_UPDATED_AT.into(), now.into());
    Ok((patch, pending))
}

async fn persist_item(
    state: &AppState,
    item: Item,
    pending: Vec<PendingImage>,
) -> AppResult<Item> {
    store::insert(state.store.as_ref(), &item).await?;
    images::store_pending(state.objects.as_ref(), &state.config, pending).await?;
    Ok(item)
}

async fn require_room(state: &AppState, caller: &Identity, id: &str) -> AppResult<Room> {
    let room = store::load::<Room>(state.store.as_ref(), id).await?;
    validate::require_parent(room, caller, MSG_INVALID_ROOM)
}

pub async fn item_create(state: &AppState, caller: &Identity, req: CreateItem) -> AppResult<Item> {
    let room_id = validate::required(req.room_id.as_deref(), MSG_CREATE_FIELDS)?;
    let mut item = build_item(caller, room_id, &req.payload, MSG_CREATE_FIELDS)?;
    require_room(state, caller, room_id).await?;

    let created_at = item.created_at;
    let pending = attach_images(&mut item, &req.payload, created_at)?;
    let item = persist_item(state, item, pending).await?;
    info!(item_id = %item.id, room_id = %item.room_id, "item created");
    Ok(item)
}

/// Batch create under one room. Every element is validated and decoded before
/// any write, then the creates fan out concurrently.
pub async fn item_batch_create(
    state: &AppState,
    caller: &Identity,
    req: BatchCreateItems,
) -> AppResult<Vec<Item>> {
    let room_id = validate::required(req.room_id.as_deref(), MSG_ROOM_PARAM)?;
    validate::required_batch(&req.items, MSG_EMPTY_BATCH)?;

    let mut prepared = Vec::with_capacity(req.items.len());
    for payload in &req.items {
        let mut item = build_item(caller, room_id, payload, MSG_ELEMENT_FIELDS)?;
        let created_at = item.created_at;
        let pending = attach_images(&mut item, payload, created_at)?;
        prepared.push((item, pending));
    }
    require_room(state, caller, room_id).await?;

    let mut creates = Vec::with_capacity(prepared.len());
    for (item, pending) in prepared {
        creates.push(persist_item(state, item, pending));
    }
    let items = try_join_all(creates).await?;

    info!(count = items.len(), room_id = %room_id, "items batch created");
    Ok(items)
}

pub async fn item_get(state: &AppState, caller: &Identity, id: &str) -> AppResult<Item> {
    let item = store::load::<Item>(state.store.as_ref(), id).await?;
    validate::require_owned(item, caller)
}

/// Active items of one room, sorted by description.
pub async fn item_list(
    state: &AppState,
    caller: &Identity,
    room_id: Option<&str>,
) -> AppResult<Vec<Item>> {
    let room_id = room_id
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request(MSG_ROOM_PARAM))?;

    let items: Vec<Item> =
        store::list_children(state.store.as_ref(), room_id, Visibility::Active).await?;
    let mut items: Vec<Item> = items
        .into_iter()
        .filter(|item| item.owner_id == caller.user_id)
        .collect();
    items.sort_by(|a, b| a.description.cmp(&b.description));
    Ok(items)
}

pub async fn item_update(
    state: &AppState,
    caller: &Identity,
    id: &str,
    req: ItemPayload,
) -> AppResult<Item> {
    let (patch, pending) = update_patch(id, &caller.user_id, &req)?;
    let current = store::load::<Item>(state.store.as_ref(), id).await?;
    let current = validate::require_owned(current, caller)?;

    let updated = store::patch(state.store.as_ref(), &current.id, patch).await?;
    images::store_pending(state.objects.as_ref(), &state.config, pending).await?;
    Ok(updated)
}

pub async fn item_delete(state: &AppState, caller: &Identity, id: &str) -> AppResult<Item> {
    let item = store::load::<Item>(state.store.as_ref(), id).await?;
    let item = validate::require_owned(item, caller)?;
    let deleted = store::patch(state.store.as_ref(), &item.id, cascade::deletion_patch()).await?;
    info!(item_id = %item.id, "item deleted");
    Ok(deleted)
}
