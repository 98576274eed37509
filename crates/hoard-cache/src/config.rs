use std::path::Path;
use std::time::Duration;

use hoard_fresh::FreshnessPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

const MIB: usize = 1024 * 1024;

/// Configuration for the cache engine.
///
/// Every field has a default, so a TOML file only needs to name what it
/// changes:
///
/// ```toml
/// chunk_size = 8192
/// public_high_mark = 4096
///
/// [freshness]
/// shared = false
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of one body chunk, in bytes.
    pub chunk_size: usize,
    /// Hard cap on live objects, public and private together.
    pub object_high_mark: usize,
    /// The reclaimer starts evicting when the public count exceeds this.
    pub public_high_mark: usize,
    /// ...and stops once the public count is back down to this.
    pub public_low_mark: usize,
    /// Chunk memory, in bytes, above which the reclaimer drops chunk buffers
    /// already written out to disk.
    pub chunk_high_mark: usize,
    /// Chunk memory target for that sweep.
    pub chunk_low_mark: usize,
    /// Hard cap on chunk memory; allocating past it forces a full sweep and
    /// then fails with `OutOfMemory`.
    pub chunk_critical_mark: usize,
    /// Period of the scheduled reclaim handler.
    pub reclaim_interval_secs: u64,
    /// Delay of the one-shot reclaim scheduled when the public count reaches
    /// `public_low_mark`.
    pub reclaim_delay_secs: u64,
    /// Freshness evaluation knobs.
    pub freshness: FreshnessPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            object_high_mark: 2048,
            public_high_mark: 1024,
            public_low_mark: 768,
            chunk_high_mark: 24 * MIB,
            chunk_low_mark: 16 * MIB,
            chunk_critical_mark: 32 * MIB,
            reclaim_interval_secs: 60,
            reclaim_delay_secs: 5,
            freshness: FreshnessPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> CacheResult<String> {
        toml::to_string(self).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Check that the watermarks are ordered and the chunk size is usable.
    pub fn validate(&self) -> CacheResult<()> {
        if self.chunk_size == 0 {
            return Err(CacheError::Config("chunk_size must be nonzero".into()));
        }
        if !(self.public_low_mark <= self.public_high_mark
            && self.public_high_mark <= self.object_high_mark)
        {
            return Err(CacheError::Config(format!(
                "object watermarks out of order: low {} <= high {} <= object {} required",
                self.public_low_mark, self.public_high_mark, self.object_high_mark
            )));
        }
        if !(self.chunk_low_mark <= self.chunk_high_mark
            && self.chunk_high_mark <= self.chunk_critical_mark)
        {
            return Err(CacheError::Config(format!(
                "chunk watermarks out of order: low {} <= high {} <= critical {} required",
                self.chunk_low_mark, self.chunk_high_mark, self.chunk_critical_mark
            )));
        }
        if !(0.0..=1.0).contains(&self.freshness.max_age_fraction) {
            return Err(CacheError::Config(format!(
                "max_age_fraction {} outside [0, 1]",
                self.freshness.max_age_fraction
            )));
        }
        Ok(())
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn reclaim_delay(&self) -> Duration {
        Duration::from_secs(self.reclaim_delay_secs)
    }
}
