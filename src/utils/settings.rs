use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::constants::*;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is corrupt: {0}")]
    Decode(#[from] bincode::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Capacity policy and packing knobs for every pool a manager creates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PoolSettings {
    pub default_vertex_capacity: u32,
    pub default_index_capacity: u32,
    pub max_parts_per_pool: usize,
    /// Placements farther than this from a pool's origin go elsewhere.
    pub max_origin_distance: f64,
    /// Above this wasted-space ratio, inserts try interior gaps first.
    pub fragmentation_threshold: f32,
    #[serde(default = "default_recycle_tolerance")]
    pub recycle_tolerance: f32,
    #[serde(default = "default_recycler_max_retained")]
    pub recycler_max_retained: usize,
    /// Indices live in their own GPU buffer (counted in memory stats).
    #[serde(default = "default_dedicated_index_buffer")]
    pub dedicated_index_buffer: bool,
}

fn default_recycle_tolerance() -> f32 {
    RECYCLE_TOLERANCE
}
fn default_recycler_max_retained() -> usize {
    RECYCLER_MAX_RETAINED
}
fn default_dedicated_index_buffer() -> bool {
    true
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            default_vertex_capacity: DEFAULT_VERTEX_CAPACITY,
            default_index_capacity: DEFAULT_INDEX_CAPACITY,
            max_parts_per_pool: MAX_PARTS_PER_POOL,
            max_origin_distance: MAX_ORIGIN_DISTANCE,
            fragmentation_threshold: FRAGMENTATION_THRESHOLD,
            recycle_tolerance: default_recycle_tolerance(),
            recycler_max_retained: default_recycler_max_retained(),
            dedicated_index_buffer: default_dedicated_index_buffer(),
        }
    }
}

impl PoolSettings {
    pub fn max_origin_distance_sq(&self) -> f64 {
        self.max_origin_distance * self.max_origin_distance
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.default_vertex_capacity == 0 || self.default_index_capacity == 0 {
            return Err(SettingsError::Invalid(
                "pool capacities must be non-zero".to_string(),
            ));
        }
        if self.max_parts_per_pool == 0 {
            return Err(SettingsError::Invalid(
                "max_parts_per_pool must be non-zero".to_string(),
            ));
        }
        if !(self.max_origin_distance > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "max_origin_distance must be positive, got {}",
                self.max_origin_distance
            )));
        }
        if !(0.0..=1.0).contains(&self.fragmentation_threshold) {
            return Err(SettingsError::Invalid(format!(
                "fragmentation_threshold must be within 0..=1, got {}",
                self.fragmentation_threshold
            )));
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let encoded: Vec<u8> = bincode::serialize(self)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let mut file = File::open(path)?;
        let mut encoded = Vec::new();
        file.read_to_end(&mut encoded)?;
        let settings: PoolSettings = bincode::deserialize(&encoded)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `path`, falling back to defaults when it is missing or unusable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => {
                tracing::info!("Loaded pool settings from {}", path.display());
                settings
            }
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No pool settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to load pool settings: {}", e);
                tracing::warn!("Using default pool settings.");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.bin");
        let settings = PoolSettings {
            default_vertex_capacity: 1000,
            fragmentation_threshold: 0.1,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(PoolSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn missing_or_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.bin");
        assert_eq!(PoolSettings::load_or_default(&missing), PoolSettings::default());

        let corrupt = dir.path().join("bad.bin");
        std::fs::write(&corrupt, [1u8, 2, 3]).unwrap();
        assert!(matches!(
            PoolSettings::load(&corrupt),
            Err(SettingsError::Decode(_))
        ));
        assert_eq!(PoolSettings::load_or_default(&corrupt), PoolSettings::default());
    }

    #[test]
    fn validate_rejects_nonsense() {
        let bad = PoolSettings {
            max_parts_per_pool: 0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(SettingsError::Invalid(_))));
        assert!(PoolSettings::default().validate().is_ok());
    }
}
