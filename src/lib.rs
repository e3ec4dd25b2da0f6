//! Household inventory engine: ownership-scoped CRUD over dwellings, rooms
//! and items, soft-delete cascades, monetary aggregation, change-driven
//! search indexing and image attachment handling.

pub mod admin;
pub mod aggregate;
pub mod cascade;
pub mod config;
pub mod dwelling;
pub mod error;
pub mod id;
pub mod identity;
pub mod images;
pub mod index;
pub mod item;
pub mod logging;
pub mod model;
pub mod objects;
pub mod response;
pub mod room;
pub mod search;
pub mod state;
pub mod store;
pub mod support;
pub mod sync;
pub mod thumbnails;
pub mod time;
pub mod validate;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use identity::Identity;
pub use model::{Dwelling, EntityKind, Item, Room};
pub use response::{envelope, Envelope};
pub use state::AppState;
