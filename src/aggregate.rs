use serde::Serialize;
use serde_json::Value;

use crate::error::AppResult;
use crate::model::{Item, Room};
use crate::store::{self, EntityStore, Visibility};

/// Derived money totals over a set of items. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonetaryAggregate {
    /// Sum of coerced quantities, not the record count.
    pub item_count: f64,
    /// Sum of quantity times price per item.
    pub total_value: f64,
    /// Last non-empty currency seen in iteration order. Carried-over quirk;
    /// callers must not treat it as a true aggregate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl MonetaryAggregate {
    pub fn empty() -> Self {
        MonetaryAggregate {
            item_count: 0.0,
            total_value: 0.0,
            currency: None,
        }
    }
}

/// Numeric coercion for quantity and price attributes: JSON numbers pass
/// through, strings must parse in full, everything else is 0.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(0.0)
            }
        }
        _ => 0.0,
    }
}

pub fn aggregate_items(items: &[Item]) -> MonetaryAggregate {
    let mut totals = MonetaryAggregate::empty();
    for item in items {
        let quantity = coerce_number(item.quantity.as_ref());
        let price = coerce_number(item.price.as_ref());
        totals.item_count += quantity;
        totals.total_value += quantity * price;
        if let Some(currency) = &item.price_currency {
            if !currency.is_empty() {
                totals.currency = Some(currency.clone());
            }
        }
    }
    totals
}

/// Scope of an item aggregate: one room, or a dwelling resolved through its
/// active rooms.
#[derive(Debug, Clone, Copy)]
pub enum ItemScope<'a> {
    Room(&'a str),
    Dwelling(&'a str),
}

pub async fn item_aggregate(
    store: &dyn EntityStore,
    scope: ItemScope<'_>,
) -> AppResult<MonetaryAggregate> {
    let items = collect_items(store, scope).await?;
    Ok(aggregate_items(&items))
}

/// Count of active rooms in a dwelling.
pub async fn room_count(store: &dyn EntityStore, dwelling_id: &str) -> AppResult<usize> {
    let rooms: Vec<Room> = store::list_children(store, dwelling_id, Visibility::Active).await?;
    Ok(rooms.len())
}

async fn collect_items(store: &dyn EntityStore, scope: ItemScope<'_>) -> AppResult<Vec<Item>> {
    match scope {
        ItemScope::Room(room_id) => {
            Ok(store::list_children(store, room_id, Visibility::Active).await?)
        }
        ItemScope::Dwelling(dwelling_id) => {
            let rooms: Vec<Room> =
                store::list_children(store, dwelling_id, Visibility::Active).await?;
            // Sequential on purpose: currency carry-through depends on a
            // stable room-then-item iteration order.
            let mut items = Vec::new();
            for room in &rooms {
                let room_items: Vec<Item> =
                    store::list_children(store, &room.id, Visibility::Active).await?;
                items.extend(room_items);
            }
            Ok(items)
        }
    }
}
