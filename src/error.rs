//! Error types for the sourcecache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache or tracker configuration is
//!   invalid (zero window, zero granularity, unknown cache mode).
//! - [`InvariantError`]: Returned by `check_invariants` when the usage maps,
//!   the value map, or the byte accounting disagree.
//! - [`IntegrityError`]: A cached buffer no longer matches the hash taken
//!   when it was cached. Indicates a caller bug.
//! - [`SourceError`]: Failures surfaced by the source-file adapter.
//!
//! Cleanup and eviction never produce errors. A cache miss is never an
//! error either; lock timeouts in the source adapter degrade to a miss.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use sourcecache::error::ConfigError;
//! use sourcecache::policy::event_counting::CleanupStrategy;
//!
//! let bad = CleanupStrategy {
//!     counter_granularity: 0,
//!     ..CleanupStrategy::default()
//! };
//! let err: ConfigError = bad.validate().unwrap_err();
//! assert!(err.to_string().contains("granularity"));
//! ```

use std::fmt;
use std::io;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by [`EventCountingDictionary::check_invariants`](crate::policy::event_counting::EventCountingDictionary::check_invariants)
/// and [`ConstrainedCache::check_invariants`](crate::policy::constrained::ConstrainedCache::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
///
/// Produced eagerly by `validate()` methods and builder `try_build()`; a
/// bad setting is never silently clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// IntegrityError / SourceError
// ---------------------------------------------------------------------------

/// A read-only cached buffer changed after it was cached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cached content for '{path}' was modified after caching")]
pub struct IntegrityError {
    pub path: String,
}

/// Errors from the source-file adapter.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read source '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- InvariantError ---------------------------------------------------

    #[test]
    fn invariant_display_shows_message() {
        let err = InvariantError::new("reverse map out of sync");
        assert_eq!(err.to_string(), "reverse map out of sync");
        assert_eq!(err.message(), "reverse map out of sync");
    }

    #[test]
    fn invariant_clone_and_eq() {
        let a = InvariantError::new("x");
        assert_eq!(a.clone(), a);
    }

    // -- ConfigError ------------------------------------------------------

    #[test]
    fn config_display_shows_message() {
        let err = ConfigError::new("usage window must be > 0");
        assert_eq!(err.to_string(), "usage window must be > 0");
        assert_eq!(err.message(), "usage window must be > 0");
    }

    #[test]
    fn errors_implement_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<InvariantError>();
        assert_error::<ConfigError>();
        assert_error::<IntegrityError>();
        assert_error::<SourceError>();
    }

    // -- SourceError ------------------------------------------------------

    #[test]
    fn source_error_wraps_integrity() {
        let err: SourceError = IntegrityError {
            path: "/a.jpg".into(),
        }
        .into();
        assert!(matches!(err, SourceError::Integrity(_)));
        assert!(err.to_string().contains("/a.jpg"));
    }

    #[test]
    fn source_error_io_keeps_source() {
        use std::error::Error as _;

        let err = SourceError::Io {
            path: "/missing.png".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/missing.png"));
        assert!(err.source().is_some());
    }
}
