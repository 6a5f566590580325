//! Configuration constants and engine settings for LeafDB.

use std::path::{Path, PathBuf};

use super::error::{Error, Result};

/// Size of a page in bytes (4KB).
///
/// Every space file is a flat sequence of pages of this size. Page N lives at
/// file offset `N × PAGE_SIZE`.
///
/// # Memory Layout
/// Offsets inside a page are stored as `u16`, so the page size must stay
/// below 64KB.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of pages in one space with u32 page numbers.
pub const MAX_PAGES: u64 = u32::MAX as u64;

/// Default number of pages held by the buffer pool (~4MB).
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Default fraction of the pool that may be dirty before a batch flush.
pub const DEFAULT_DIRTY_RATIO: f64 = 0.10;

/// Smallest B+-tree order accepted by the index layer.
pub const MIN_ORDER: u16 = 3;

/// Largest B+-tree order accepted by the index layer.
///
/// A node never persists more than `order` entries and each entry is one
/// slot, so the order is bounded by the slot directory size.
pub const MAX_ORDER: u16 = 254;

/// Engine-wide settings.
///
/// # Environment Variables
/// [`EngineConfig::from_env`] reads:
/// - `LEAFDB_DATA_DIR`: directory holding one file per space (default: `./data`)
/// - `LEAFDB_POOL_CAPACITY`: buffer pool size in pages (default: 1024)
/// - `LEAFDB_DIRTY_RATIO`: dirty fraction that triggers a batch flush (default: 0.10)
/// - `LEAFDB_SYNC_ON_FLUSH`: `true`/`false`, fsync after each flush (default: true)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory containing the space files.
    pub data_dir: PathBuf,
    /// Number of pages the buffer pool caches.
    pub pool_capacity: usize,
    /// Fraction of `pool_capacity` that may be dirty before half of the dirty
    /// pages are written back.
    pub dirty_ratio: f64,
    /// Whether flushes end with an fsync of every touched space.
    pub sync_on_flush: bool,
}

impl EngineConfig {
    /// Default data directory.
    pub const DEFAULT_DATA_DIR: &'static str = "./data";

    /// Settings rooted at `data_dir` with default tuning.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    pub fn with_dirty_ratio(mut self, dirty_ratio: f64) -> Self {
        self.dirty_ratio = dirty_ratio;
        self
    }

    pub fn with_sync_on_flush(mut self, sync_on_flush: bool) -> Self {
        self.sync_on_flush = sync_on_flush;
        self
    }

    /// Check that the settings describe a usable engine.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` for a zero-sized pool or a dirty ratio
    /// outside `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(Error::InvalidConfig(
                "pool_capacity must be greater than zero".to_string(),
            ));
        }
        if !(self.dirty_ratio > 0.0 && self.dirty_ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "dirty_ratio must be in (0, 1], got {}",
                self.dirty_ratio
            )));
        }
        Ok(())
    }

    /// Load settings from `LEAFDB_*` environment variables.
    ///
    /// Unset variables fall back to their defaults.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if a variable is set but unparsable, or
    /// if the resulting settings fail [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("LEAFDB_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(capacity) = parse_env::<usize>("LEAFDB_POOL_CAPACITY")? {
            config.pool_capacity = capacity;
        }
        if let Some(ratio) = parse_env::<f64>("LEAFDB_DIRTY_RATIO")? {
            config.dirty_ratio = ratio;
        }
        if let Some(sync) = parse_env::<bool>("LEAFDB_SYNC_ON_FLUSH")? {
            config.sync_on_flush = sync;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(Self::DEFAULT_DATA_DIR),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            dirty_ratio: DEFAULT_DIRTY_RATIO,
            sync_on_flush: true,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("invalid value for {name}: {raw:?}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_fits_u16_offsets() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert!(PAGE_SIZE <= u16::MAX as usize);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_capacity, DEFAULT_POOL_CAPACITY);
        assert_eq!(config.dirty_ratio, DEFAULT_DIRTY_RATIO);
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::new("/tmp/leaf")
            .with_pool_capacity(8)
            .with_dirty_ratio(0.5)
            .with_sync_on_flush(false);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/leaf"));
        assert_eq!(config.pool_capacity, 8);
        assert_eq!(config.dirty_ratio, 0.5);
        assert!(!config.sync_on_flush);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::default().with_pool_capacity(0).validate().is_err());
        assert!(EngineConfig::default().with_dirty_ratio(0.0).validate().is_err());
        assert!(EngineConfig::default().with_dirty_ratio(1.5).validate().is_err());
    }
}
