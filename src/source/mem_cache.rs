//! Source-file memory cache.
//!
//! Wraps a [`ConstrainedCache`] of [`CachedFile`]s keyed by case-insensitive
//! virtual path. A miss in [`CacheMode::Mem`] materializes the file under a
//! per-path lock, so concurrent requests for the same path read it from its
//! source once. Waiters that cannot take the lock within
//! [`SourceCacheConfig::lock_timeout`] report a miss instead of blocking.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::builder::ConstrainedCacheBuilder;
use crate::clock::{Clock, MonotonicClock};
use crate::ds::keyed_lock::KeyedLocks;
use crate::error::{ConfigError, SourceError};
use crate::policy::constrained::ConstrainedCache;
use crate::policy::event_counting::CleanupMode;
use crate::source::cached_file::{CachedFile, SourceFile};
use crate::source::{CacheMode, SourceCacheConfig};
use crate::traits::{CaseInsensitive, KeyComparer};

/// In-memory cache of source files keyed by case-insensitive path.
#[derive(Debug)]
pub struct SourceMemCache {
    cache: ConstrainedCache<CaseInsensitive, CachedFile>,
    materializing: KeyedLocks<String>,
    config: SourceCacheConfig,
}

impl SourceMemCache {
    pub fn new(config: SourceCacheConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: SourceCacheConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let sizing = config.clone();
        let cache = ConstrainedCacheBuilder::new(CaseInsensitive)
            .size_calculator(move |key: &str, file: &CachedFile| sizing.entry_size(key, file.len()))
            .max_bytes(config.max_bytes)
            .usage_window(config.usage_window)
            .min_cleanup_interval(config.minimum_cleanup_interval)
            .clock(clock)
            .try_build()?;
        Ok(Self {
            cache,
            materializing: KeyedLocks::new(),
            config,
        })
    }

    /// Returns the cached copy of `key`, materializing it from `original`
    /// first when `mode` is [`CacheMode::Mem`].
    ///
    /// `Ok(None)` means "serve the original": caching is off, or another
    /// thread held the key longer than the lock timeout.
    pub fn get_file_if_cached(
        &self,
        key: &str,
        mode: CacheMode,
        original: &dyn SourceFile,
    ) -> Result<Option<Arc<CachedFile>>, SourceError> {
        if let Some(file) = self.cache.get(key) {
            return Ok(Some(file));
        }
        if mode != CacheMode::Mem {
            return Ok(None);
        }

        let lock_key = CaseInsensitive.canonicalize(key);
        let Some(_guard) = self
            .materializing
            .try_lock_for(&lock_key, self.config.lock_timeout)
        else {
            trace!(key, timeout = ?self.config.lock_timeout, "timed out waiting to materialize source");
            return Ok(None);
        };
        if let Some(file) = self.cache.get(key) {
            return Ok(Some(file));
        }

        let file = match CachedFile::materialize(original) {
            Ok(file) => file,
            Err(source) => {
                warn!(key, path = original.virtual_path(), error = %source, "failed to read source");
                return Err(SourceError::Io {
                    path: original.virtual_path().to_string(),
                    source,
                });
            },
        };
        file.verify()?;

        let file = Arc::new(file);
        trace!(key, bytes = file.len(), "materialized source into memory");
        self.cache.set(key, Arc::clone(&file));
        Ok(Some(file))
    }

    /// Cached copy of `key` without materializing.
    pub fn get(&self, key: &str) -> Option<Arc<CachedFile>> {
        self.cache.get(key)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.remove(key).is_some()
    }

    pub fn ping_cleanup(&self) -> bool {
        self.cache.ping_cleanup()
    }

    pub fn cleanup(&self, mode: CleanupMode) -> bool {
        self.cache.cleanup(mode)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.cache.bytes_used()
    }

    pub fn config(&self) -> &SourceCacheConfig {
        &self.config
    }

    /// The underlying value cache.
    pub fn cache(&self) -> &ConstrainedCache<CaseInsensitive, CachedFile> {
        &self.cache
    }
}
