use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::objects::ObjectStore;

/// Slot name for the single room image.
pub const ROOM_IMAGE_SLOT: &str = "image";
/// Item slots in their upload order.
pub const ITEM_IMAGE_SLOTS: [&str; 4] = ["image_full", "receipt_image", "image_1", "image_2"];

static DATA_URI_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/\w+;base64,").expect("data uri regex"));

/// Decoded inline payload plus the key it will live under, prepared before
/// the record write so malformed input fails as validation.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub slot: &'static str,
    /// Unprefixed key, the value persisted on the record.
    pub key: String,
    pub bytes: Vec<u8>,
}

pub fn decode_payload(payload: &str) -> AppResult<Vec<u8>> {
    let body = DATA_URI_PREFIX.replace(payload, "");
    STANDARD
        .decode(body.as_bytes())
        .map_err(|_| AppError::validation("invalid image payload"))
}

/// Deterministic record key for one image slot.
pub fn record_key(owner_id: &str, record_id: &str, slot: &str, now: i64) -> String {
    format!("{owner_id}_{record_id}_{slot}_{now}_img")
}

/// Full object-store key for a record key under the raw prefix.
pub fn raw_object_key(config: &AppConfig, record_key: &str) -> String {
    format!("{}{}", config.raw_image_prefix, record_key)
}

pub fn prepare(
    owner_id: &str,
    record_id: &str,
    slot: &'static str,
    payload: &str,
    now: i64,
) -> AppResult<PendingImage> {
    let bytes = decode_payload(payload)?;
    Ok(PendingImage {
        slot,
        key: record_key(owner_id, record_id, slot, now),
        bytes,
    })
}

/// Upload prepared payloads one at a time, aborting on the first failure.
/// Keys already persisted on the record stay persisted.
pub async fn store_pending(
    objects: &dyn ObjectStore,
    config: &AppConfig,
    pending: Vec<PendingImage>,
) -> AppResult<()> {
    for image in pending {
        objects
            .put(&raw_object_key(config, &image.key), image.bytes)
            .await?;
        tracing::debug!(slot = image.slot, key = %image.key, "image stored");
    }
    Ok(())
}
