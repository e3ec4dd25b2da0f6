use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{self, ItemScope, MonetaryAggregate};
use crate::cascade;
use crate::error::{AppError, AppResult};
use crate::id::new_uuid_v7;
use crate::identity::Identity;
use crate::model::{Attributes, Dwelling, Room, ATTR_UPDATED_AT};
use crate::state::AppState;
use crate::store::{self, EntityStore, Visibility};
use crate::time::now_ms;
use crate::validate;

const MSG_NAME_TYPE_REQUIRED: &str = "name and type are required";
const MSG_EMPTY_BATCH: &str = "dwellings must not be empty";
const MSG_NO_UPDATE_FIELDS: &str = "at least one dwelling attribute is required";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDwelling {
    #[serde(default, alias = "dwellingName")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "dwellingType")]
    pub dwelling_type: Option<String>,
    #[serde(default, alias = "addressLine1")]
    pub address_line1: Option<String>,
    #[serde(default, alias = "addressLine2")]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "postCode")]
    pub post_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDwelling {
    #[serde(default, alias = "dwellingName")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "dwellingType")]
    pub dwelling_type: Option<String>,
    #[serde(default, alias = "addressLine1")]
    pub address_line1: Option<String>,
    #[serde(default, alias = "addressLine2")]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "postCode")]
    pub post_code: Option<String>,
}

/// Create response: the dwelling together with the Misc room the compound
/// create produced.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedDwelling {
    pub dwelling: Dwelling,
    pub misc_room: Room,
}

/// Dwelling enriched with the derived numbers get/list clients render.
#[derive(Debug, Clone, Serialize)]
pub struct DwellingOverview {
    #[serde(flatten)]
    pub dwelling: Dwelling,
    pub room_count: usize,
    #[serde(flatten)]
    pub totals: MonetaryAggregate,
}

fn build_dwelling(caller: &Identity, req: &CreateDwelling) -> AppResult<Dwelling> {
    let name = validate::required(req.name.as_deref(), MSG_NAME_TYPE_REQUIRED)?;
    let dwelling_type = validate::required(req.dwelling_type.as_deref(), MSG_NAME_TYPE_REQUIRED)?;
    let now = now_ms();
    Ok(Dwelling {
        id: new_uuid_v7(),
        owner_id: caller.user_id.clone(),
        name: name.to_string(),
        dwelling_type: dwelling_type.to_string(),
        address_line1: req.address_line1.clone(),
        address_line2: req.address_line2.clone(),
        city: req.city.clone(),
        post_code: req.post_code.clone(),
        deleted: false,
        created_at: now,
        updated_at: now,
    })
}

fn update_patch(req: &UpdateDwelling) -> AppResult<Attributes> {
    let mut patch = Attributes::new();
    if let Some(name) = &req.name {
        patch.insert("name".into(), name.clone().into());
    }
    if let Some(dwelling_type) = &req.dwelling_type {
        patch.insert("type".into(), dwelling_type.clone().into());
    }
    if let Some(line1) = &req.address_line1 {
        patch.insert("address_line1".into(), line1.clone().into());
    }
    if let Some(line2) = &req.address_line2 {
        patch.insert("address_line2".into(), line2.clone().into());
    }
    if let Some(city) = &req.city {
        patch.insert("city".into(), city.clone().into());
    }
    if let Some(post_code) = &req.post_code {
        patch.insert("post_code".into(), post_code.clone().into());
    }
    if patch.is_empty() {
        return Err(AppError::validation(MSG_NO_UPDATE_FIELDS));
    }
    patch.insert(ATTR_UPDATED_AT.into(), now_ms().into());
    Ok(patch)
}

async fn overview(store: &dyn EntityStore, dwelling: Dwelling) -> AppResult<DwellingOverview> {
    let room_count = aggregate::room_count(store, &dwelling.id).await?;
    let totals = aggregate::item_aggregate(store, ItemScope::Dwelling(&dwelling.id)).await?;
    Ok(DwellingOverview {
        dwelling,
        room_count,
        totals,
    })
}

pub async fn dwelling_create(
    state: &AppState,
    caller: &Identity,
    req: CreateDwelling,
) -> AppResult<CreatedDwelling> {
    let dwelling = build_dwelling(caller, &req)?;
    let misc_room = cascade::create_dwelling_records(state.store.as_ref(), &dwelling).await?;
    info!(dwelling_id = %dwelling.id, owner = %caller.user_id, "dwelling created");
    Ok(CreatedDwelling {
        dwelling,
        misc_room,
    })
}

/// Batch create: every element is validated before any write, then the
/// compound creates fan out concurrently.
pub async fn dwelling_batch_create(
    state: &AppState,
    caller: &Identity,
    req: Vec<CreateDwelling>,
) -> AppResult<Vec<CreatedDwelling>> {
    validate::required_batch(&req, MSG_EMPTY_BATCH)?;
    let dwellings = req
        .iter()
        .map(|element| build_dwelling(caller, element))
        .collect::<AppResult<Vec<_>>>()?;

    let mut creates = Vec::with_capacity(dwellings.len());
    for dwelling in &dwellings {
        creates.push(cascade::create_dwelling_records(state.store.as_ref(), dwelling));
    }
    let rooms = try_join_all(creates).await?;

    info!(count = dwellings.len(), owner = %caller.user_id, "dwellings batch created");
    Ok(dwellings
        .into_iter()
        .zip(rooms)
        .map(|(dwelling, misc_room)| CreatedDwelling {
            dwelling,
            misc_room,
        })
        .collect())
}

pub async fn dwelling_get(
    state: &AppState,
    caller: &Identity,
    id: &str,
) -> AppResult<DwellingOverview> {
    let dwelling = store::load::<Dwelling>(state.store.as_ref(), id).await?;
    let dwelling = validate::require_owned(dwelling, caller)?;
    overview(state.store.as_ref(), dwelling).await
}

/// Admin-only listing of every active dwelling, each row enriched
/// concurrently.
pub async fn dwelling_list(state: &AppState, caller: &Identity) -> AppResult<Vec<DwellingOverview>> {
    validate::require_admin(caller)?;
    let dwellings: Vec<Dwelling> =
        store::scan_all(state.store.as_ref(), Visibility::Active).await?;

    let mut lookups = Vec::with_capacity(dwellings.len());
    for dwelling in dwellings {
        lookups.push(overview(state.store.as_ref(), dwelling));
    }
    try_join_all(lookups).await
}

pub async fn dwelling_update(
    state: &AppState,
    caller: &Identity,
    id: &str,
    req: UpdateDwelling,
) -> AppResult<Dwelling> {
    let patch = update_patch(&req)?;
    let current = store::load::<Dwelling>(state.store.as_ref(), id).await?;
    let current = validate::require_owned(current, caller)?;
    let updated = store::patch(state.store.as_ref(), &current.id, patch).await?;
    Ok(updated)
}

/// Soft delete with the owner-scoped room and item cascades.
pub async fn dwelling_delete(state: &AppState, caller: &Identity, id: &str) -> AppResult<Dwelling> {
    let dwelling = store::load::<Dwelling>(state.store.as_ref(), id).await?;
    let dwelling = validate::require_owned(dwelling, caller)?;
    let (updated, _) = cascade::soft_delete_dwelling(state.store.as_ref(), &dwelling).await?;
    Ok(updated)
}
