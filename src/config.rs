//! Environment-driven runtime configuration.
//!
//! Persistence of derived state (handler metadata, compiled routing data) can
//! be switched off per deployment without code changes:
//!
//! - `WAYMARK_METADATA_CACHE=off` disables the metadata blob
//! - `WAYMARK_ROUTE_CACHE=off` disables the compiled-routes blob
//!
//! Any other value (or an unset variable) leaves persistence on.

use std::env;

/// Cache behavior loaded from environment variables.
///
/// Load once at startup and pass to the store and table constructors.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Whether the metadata store reads/writes its blob.
    pub persist_metadata: bool,
    /// Whether the route table reads/writes its compiled data.
    pub persist_routes: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persist_metadata: true,
            persist_routes: true,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        fn enabled(var: &str) -> bool {
            !matches!(
                env::var(var).as_deref(),
                Ok("off") | Ok("0") | Ok("false")
            )
        }
        Self {
            persist_metadata: enabled("WAYMARK_METADATA_CACHE"),
            persist_routes: enabled("WAYMARK_ROUTE_CACHE"),
        }
    }
}
