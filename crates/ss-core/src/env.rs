//! Environment variable helpers
//!
//! Every runtime knob of the server can be preset from the environment.
//! The recognized keys live here so the logger, the config layer and the
//! demo binaries agree on their spelling.
//!
//! ```ignore
//! use ss_core::env::{env_get, CACHE_LIMIT_ENV};
//!
//! let cache: usize = env_get(CACHE_LIMIT_ENV, 16);
//! ```

use std::str::FromStr;

/// Idle worker retention bound
pub const CACHE_LIMIT_ENV: &str = "SS_CACHE_LIMIT";
/// Listen backlog
pub const BACKLOG_ENV: &str = "SS_BACKLOG";
/// Log threshold (name or digit)
pub const LOG_LEVEL_ENV: &str = "SS_LOG_LEVEL";
/// Flush stderr after each log line
pub const LOG_FLUSH_ENV: &str = "SS_FLUSH_EPRINT";
/// Worker thread stack size in KiB
pub const WORKER_STACK_KB_ENV: &str = "SS_WORKER_STACK_KB";

/// Get environment variable parsed as type T, or return default
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
