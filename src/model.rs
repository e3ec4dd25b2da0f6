use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw attribute map, the shape records take inside the entity store.
pub type Attributes = Map<String, Value>;

pub const ATTR_ID: &str = "id";
pub const ATTR_OWNER_ID: &str = "owner_id";
pub const ATTR_DWELLING_ID: &str = "dwelling_id";
pub const ATTR_ROOM_ID: &str = "room_id";
pub const ATTR_DELETED: &str = "deleted";
pub const ATTR_UPDATED_AT: &str = "updated_at";

/// Name and type of the protected room created with every dwelling.
pub const MISC_ROOM_NAME: &str = "Misc";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Dwelling,
    Room,
    Item,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Dwelling, EntityKind::Room, EntityKind::Item];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Dwelling => "dwelling",
            EntityKind::Room => "room",
            EntityKind::Item => "item",
        }
    }

    pub fn parse(value: &str) -> Option<EntityKind> {
        EntityKind::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Attribute that scopes this kind under its parent, if it has one.
    pub fn parent_attr(&self) -> Option<&'static str> {
        match self {
            EntityKind::Dwelling => None,
            EntityKind::Room => Some(ATTR_DWELLING_ID),
            EntityKind::Item => Some(ATTR_ROOM_ID),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record type. Ownership is immutable after creation; `deleted`
/// is the soft-delete flag that list/query operations filter on.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn deleted(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dwelling {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub dwelling_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_code: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Entity for Dwelling {
    const KIND: EntityKind = EntityKind::Dwelling;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn deleted(&self) -> bool {
        self.deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub owner_id: String,
    pub dwelling_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Set only on the system-generated Misc room, which normal room
    /// operations must refuse to touch.
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Entity for Room {
    const KIND: EntityKind = EntityKind::Room;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn deleted(&self) -> bool {
        self.deleted
    }
}

/// Items keep `quantity` and `price` exactly as received (JSON number or
/// string); coercion to f64 happens at aggregation time only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub owner_id: String,
    pub room_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_full: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_2: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Entity for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn deleted(&self) -> bool {
        self.deleted
    }
}

pub fn to_attributes<T: Entity>(entity: &T) -> Result<Attributes, serde_json::Error> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        _ => Err(serde::ser::Error::custom("entity did not serialize to a map")),
    }
}

pub fn from_attributes<T: Entity>(attrs: Attributes) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(attrs))
}
