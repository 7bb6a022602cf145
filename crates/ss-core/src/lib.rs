//! # ss-core
//!
//! Core types for the ss connection-dispatch server.
//!
//! This crate is platform-agnostic and contains no socket or thread code.
//! The worker pool, handoff and acceptor live in `ss-runtime`.
//!
//! ## Modules
//!
//! - `logger` - Leveled, lockable logger with pluggable sinks and macros
//! - `error` - Error types and the invariant-abort helper
//! - `env` - Environment variable utilities and recognized keys

pub mod logger;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use logger::{sink_fn, FnSink, LogLevel, LogSink, Logger, StderrSink, WriterSink};
pub use error::{io_errno, ListenError, SsError, SsResult};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Defaults shared by the runtime and the demo binaries
pub mod constants {
    /// Idle workers retained for reuse unless configured otherwise
    pub const DEFAULT_CACHE_LIMIT: usize = 16;

    /// Pending-connection queue length passed to listen()
    pub const DEFAULT_BACKLOG: i32 = 128;

    /// Worker thread name prefix; the worker id is appended
    pub const DEFAULT_WORKER_NAME: &str = "ss-worker";

    /// Demo server TCP port
    pub const DEFAULT_PORT: u16 = 1234;
}
