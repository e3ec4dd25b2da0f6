use serde::{Deserialize, Serialize};

/// Runtime tunables. Defaults suit tests; deployments override through
/// `HOMESTEAD_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum number of hits a search query returns.
    pub search_size: usize,
    /// Object-key prefix for raw uploaded image bytes.
    pub raw_image_prefix: String,
    /// Object-key prefix for derived thumbnails.
    pub thumbnail_prefix: String,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            search_size: 20,
            raw_image_prefix: "raw/".into(),
            thumbnail_prefix: "thumbnail/".into(),
            thumbnail_width: 200,
            thumbnail_height: 200,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = AppConfig::default();
        if let Some(size) = lookup("HOMESTEAD_SEARCH_SIZE").and_then(|v| v.parse().ok()) {
            cfg.search_size = size;
        }
        if let Some(prefix) = lookup("HOMESTEAD_RAW_IMAGE_PREFIX") {
            cfg.raw_image_prefix = prefix;
        }
        if let Some(prefix) = lookup("HOMESTEAD_THUMBNAIL_PREFIX") {
            cfg.thumbnail_prefix = prefix;
        }
        if let Some(width) = lookup("HOMESTEAD_THUMBNAIL_WIDTH").and_then(|v| v.parse().ok()) {
            cfg.thumbnail_width = width;
        }
        if let Some(height) = lookup("HOMESTEAD_THUMBNAIL_HEIGHT").and_then(|v| v.parse().ok()) {
            cfg.thumbnail_height = height;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.search_size, 20);
        assert!(cfg.raw_image_prefix.ends_with('/'));
        assert!(cfg.thumbnail_prefix.ends_with('/'));
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let cfg = AppConfig::from_lookup(|key| match key {
            "HOMESTEAD_SEARCH_SIZE" => Some("5".into()),
            "HOMESTEAD_THUMBNAIL_WIDTH" => Some("not a number".into()),
            "HOMESTEAD_RAW_IMAGE_PREFIX" => Some("uploads/".into()),
            _ => None,
        });
        assert_eq!(cfg.search_size, 5);
        assert_eq!(cfg.thumbnail_width, AppConfig::default().thumbnail_width);
        assert_eq!(cfg.raw_image_prefix, "uploads/");
    }
}
