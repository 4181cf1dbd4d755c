//! Source-file adapter: serves original resources from a byte-bounded
//! in-memory cache.
//!
//! ```text
//!   get_file_if_cached(key, mode, original)
//!        │
//!        ├─ cached ──────────────────────────────────────────► Some(file)
//!        │
//!        ├─ mode != Mem ─────────────────────────────────────► None
//!        │
//!        ▼
//!   per-key lock (bounded wait) ── timed out ────────────────► None
//!        │
//!        ├─ cached by the previous holder ───────────────────► Some(file)
//!        │
//!        ▼
//!   read original fully → verify → set(key, file) ───────────► Some(file)
//! ```
//!
//! A miss is never an error. Only I/O failures while reading the original
//! and content-hash mismatches surface as [`SourceError`](crate::error::SourceError).

pub mod cached_file;
pub mod mem_cache;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub use cached_file::{CachedFile, ContentHash, FsSourceFile, SourceFile};
pub use mem_cache::SourceMemCache;

/// Whether a miss should populate the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    /// Lookups only; misses fall through to the original.
    #[default]
    Off,
    /// Misses read the original into memory and cache it.
    Mem,
}

impl FromStr for CacheMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = s.trim();
        if mode.eq_ignore_ascii_case("mem") {
            Ok(Self::Mem)
        } else if mode.is_empty()
            || mode.eq_ignore_ascii_case("none")
            || mode.eq_ignore_ascii_case("default")
        {
            Ok(Self::Off)
        } else {
            Err(ConfigError::new(format!("unknown cache mode '{}'", s)))
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "none",
            Self::Mem => "mem",
        })
    }
}

/// Settings for [`SourceMemCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCacheConfig {
    /// Byte ceiling for cached content and bookkeeping.
    pub max_bytes: usize,
    /// Window over which usage is counted for eviction.
    pub usage_window: Duration,
    pub minimum_cleanup_interval: Duration,
    /// Longest a caller waits for another thread materializing the same key.
    pub lock_timeout: Duration,
    /// Bytes charged per key character.
    pub key_overhead_factor: usize,
    /// Bytes charged per entry regardless of size.
    pub fixed_entry_overhead: usize,
}

impl Default for SourceCacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            usage_window: Duration::from_secs(20 * 60),
            minimum_cleanup_interval: Duration::from_secs(10),
            lock_timeout: Duration::from_millis(3000),
            key_overhead_factor: 2,
            fixed_entry_overhead: 64,
        }
    }
}

impl SourceCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::new("source cache max_bytes must be > 0"));
        }
        if self.usage_window.is_zero() {
            return Err(ConfigError::new("usage window must be > 0"));
        }
        if self.minimum_cleanup_interval.is_zero() {
            return Err(ConfigError::new("minimum cleanup interval must be > 0"));
        }
        if self.lock_timeout.is_zero() {
            return Err(ConfigError::new("lock timeout must be > 0"));
        }
        Ok(())
    }

    /// Byte cost charged for caching `len` bytes under `key`.
    pub fn entry_size(&self, key: &str, len: usize) -> usize {
        key.len()
            .saturating_mul(self.key_overhead_factor)
            .saturating_add(len)
            .saturating_add(self.fixed_entry_overhead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("mem".parse::<CacheMode>(), Ok(CacheMode::Mem));
        assert_eq!(" MEM ".parse::<CacheMode>(), Ok(CacheMode::Mem));
        assert_eq!("None".parse::<CacheMode>(), Ok(CacheMode::Off));
        assert_eq!("default".parse::<CacheMode>(), Ok(CacheMode::Off));
        assert_eq!("".parse::<CacheMode>(), Ok(CacheMode::Off));
    }

    #[test]
    fn unknown_mode_rejected() {
        let err = "disk".parse::<CacheMode>().unwrap_err();
        assert!(err.message().contains("disk"));
    }

    #[test]
    fn mode_display_round_trips() {
        for mode in [CacheMode::Off, CacheMode::Mem] {
            assert_eq!(mode.to_string().parse::<CacheMode>(), Ok(mode));
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = SourceCacheConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.lock_timeout, Duration::from_secs(3));
    }

    #[test]
    fn invalid_configs_rejected() {
        let cases = [
            SourceCacheConfig {
                max_bytes: 0,
                ..Default::default()
            },
            SourceCacheConfig {
                usage_window: Duration::ZERO,
                ..Default::default()
            },
            SourceCacheConfig {
                minimum_cleanup_interval: Duration::ZERO,
                ..Default::default()
            },
            SourceCacheConfig {
                lock_timeout: Duration::ZERO,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn entry_size_counts_key_payload_and_overhead() {
        let config = SourceCacheConfig::default();
        assert_eq!(config.entry_size("/abc", 100), 4 * 2 + 100 + 64);
    }
}
