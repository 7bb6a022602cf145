//! Server configuration

use ss_core::constants::{DEFAULT_BACKLOG, DEFAULT_CACHE_LIMIT, DEFAULT_WORKER_NAME};
use ss_core::env::{
    env_get, env_get_bool, env_get_opt, BACKLOG_ENV, CACHE_LIMIT_ENV, LOG_FLUSH_ENV,
    LOG_LEVEL_ENV, WORKER_STACK_KB_ENV,
};
use ss_core::{LogLevel, SsError, SsResult};

/// Configuration for a server context
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum idle workers kept for reuse (does not cap busy workers)
    pub cache_limit: usize,

    /// listen() backlog for listeners created through the server
    pub backlog: i32,

    /// Initial log threshold
    pub log_level: LogLevel,

    /// Flush stderr after every log line
    pub flush_log: bool,

    /// Stack size for worker threads (None = platform default)
    pub worker_stack_size: Option<usize>,

    /// Worker thread name prefix
    pub worker_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_limit: DEFAULT_CACHE_LIMIT,
            backlog: DEFAULT_BACKLOG,
            log_level: LogLevel::Info,
            flush_log: false,
            worker_stack_size: None,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SS_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_limit: env_get(CACHE_LIMIT_ENV, defaults.cache_limit),
            backlog: env_get(BACKLOG_ENV, defaults.backlog),
            log_level: env_get(LOG_LEVEL_ENV, defaults.log_level),
            flush_log: env_get_bool(LOG_FLUSH_ENV, defaults.flush_log),
            // A size that does not fit in bytes is ignored like an unparsable one.
            worker_stack_size: env_get_opt::<usize>(WORKER_STACK_KB_ENV)
                .and_then(|kb| kb.checked_mul(1024))
                .or(defaults.worker_stack_size),
            worker_name: defaults.worker_name,
        }
    }

    /// Set the idle worker retention bound
    pub fn cache_limit(mut self, n: usize) -> Self {
        self.cache_limit = n;
        self
    }

    /// Set the listen backlog
    pub fn backlog(mut self, n: i32) -> Self {
        self.backlog = n;
        self
    }

    /// Set the initial log threshold
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn flush_log(mut self, enable: bool) -> Self {
        self.flush_log = enable;
        self
    }

    /// Set worker thread stack size in bytes
    pub fn worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    pub fn worker_name(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name = prefix.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> SsResult<()> {
        if self.backlog <= 0 {
            return Err(SsError::InvalidConfig("backlog must be positive"));
        }
        if self.worker_stack_size == Some(0) {
            return Err(SsError::InvalidConfig("worker_stack_size must be non-zero"));
        }
        if self.worker_name.is_empty() {
            return Err(SsError::InvalidConfig("worker_name must not be empty"));
        }
        Ok(())
    }
}
