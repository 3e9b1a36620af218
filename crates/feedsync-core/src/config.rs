//! Client configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};
use crate::sync::engine::EVENT_CHANNEL_CAPACITY;

/// Maximum post image size: 2 MB
pub const MAX_IMAGE_SIZE: usize = 2 * 1024 * 1024;

/// Maximum avatar size: 256 KB
pub const MAX_AVATAR_SIZE: usize = 256 * 1024;

/// Configuration for a feed client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Largest accepted post image, in bytes
    pub max_image_bytes: usize,
    /// Largest accepted avatar, in bytes
    pub max_avatar_bytes: usize,
    /// Capacity of the sync event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: MAX_IMAGE_SIZE,
            max_avatar_bytes: MAX_AVATAR_SIZE,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl FeedConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> FeedResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| FeedError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.max_image_bytes == 0 || self.max_avatar_bytes == 0 {
            return Err(FeedError::Config("upload limits must be non-zero".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(FeedError::Config("event_channel_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.max_image_bytes, 2 * 1024 * 1024);
        assert_eq!(config.max_avatar_bytes, 256 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, r#"{ "max_avatar_bytes": 1024 }"#).unwrap();
        let config = FeedConfig::load(&path).unwrap();
        assert_eq!(config.max_avatar_bytes, 1024);
        assert_eq!(config.max_image_bytes, MAX_IMAGE_SIZE);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, r#"{ "event_channel_capacity": 0 }"#).unwrap();
        assert!(matches!(FeedConfig::load(&path), Err(FeedError::Config(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(FeedConfig::load(&path), Err(FeedError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            FeedConfig::load("/definitely/not/here.json"),
            Err(FeedError::Io(_))
        ));
    }
}
