use std::io::Cursor;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::objects::{ObjectEvent, ObjectStore};

/// Thumbnail key for a raw-image object key, or `None` when the key is not
/// under the raw prefix.
pub fn thumbnail_object_key(config: &AppConfig, object_key: &str) -> Option<String> {
    object_key
        .strip_prefix(&config.raw_image_prefix)
        .map(|tail| format!("{}{}", config.thumbnail_prefix, tail))
}

/// Downscale a newly stored raw image and write it under the thumbnail
/// prefix with the same trailing key. Returns the thumbnail key.
pub async fn derive_thumbnail(
    objects: &dyn ObjectStore,
    config: &AppConfig,
    event: &ObjectEvent,
) -> AppResult<Option<String>> {
    let Some(target) = thumbnail_object_key(config, &event.key) else {
        return Ok(None);
    };
    let bytes = objects.get(&event.key).await?;
    let decoded =
        image::load_from_memory(&bytes).map_err(|e| AppError::Internal(e.to_string()))?;
    let thumb = decoded.thumbnail(config.thumbnail_width, config.thumbnail_height);
    let mut encoded = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    objects.put(&target, encoded).await?;
    Ok(Some(target))
}

/// Object-event entry point. Runs out-of-band from any request; failures
/// are logged and swallowed.
pub async fn process_event(objects: &dyn ObjectStore, config: &AppConfig, event: ObjectEvent) {
    match derive_thumbnail(objects, config, &event).await {
        Ok(Some(key)) => tracing::debug!(key = %key, "thumbnail stored"),
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(key = %event.key, error = %err, "thumbnail derivation failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::MemoryObjectStore;
    use image::{DynamicImage, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 30, 200]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn raw_uploads_get_thumbnails_with_the_same_tail() {
        let cfg = AppConfig::default();
        let objects = MemoryObjectStore::new();
        objects
            .put("raw/u_r_image_1700_img", png_bytes(800, 600))
            .await
            .unwrap();

        let event = ObjectEvent {
            key: "raw/u_r_image_1700_img".into(),
        };
        let key = derive_thumbnail(&objects, &cfg, &event).await.unwrap();
        assert_eq!(key.as_deref(), Some("thumbnail/u_r_image_1700_img"));

        let thumb = objects.get("thumbnail/u_r_image_1700_img").await.unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert!(decoded.width() <= cfg.thumbnail_width);
        assert!(decoded.height() <= cfg.thumbnail_height);
    }

    #[tokio::test]
    async fn non_raw_keys_are_ignored() {
        let cfg = AppConfig::default();
        let objects = MemoryObjectStore::new();
        let event = ObjectEvent {
            key: "thumbnail/already_done".into(),
        };
        let key = derive_thumbnail(&objects, &cfg, &event).await.unwrap();
        assert_eq!(key, None);
    }

    #[tokio::test]
    async fn corrupt_images_surface_an_error() {
        let cfg = AppConfig::default();
        let objects = MemoryObjectStore::new();
        objects
            .put("raw/u_r_image_1_img", b"not an image".to_vec())
            .await
            .unwrap();
        let event = ObjectEvent {
            key: "raw/u_r_image_1_img".into(),
        };
        let err = derive_thumbnail(&objects, &cfg, &event).await.unwrap_err();
        assert_eq!(err.status(), 500);
        // the swallowing entry point does not panic on the same input
        process_event(&objects, &cfg, event).await;
    }
}
