//! # ss-runtime
//!
//! OS-facing half of the ss server.
//!
//! This crate provides:
//! - Listener setup over TCP or local sockets
//! - The acceptor loop (readiness wait, accept, dispatch)
//! - The worker pool with its bounded idle cache
//! - Per-worker handoff slots
//! - Thread spawning behind a replaceable seam

pub mod config;
pub mod connection;
pub mod handler;
pub mod handoff;
pub mod spawn;
pub mod worker;
pub mod pool;
pub mod listener;
pub mod acceptor;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::ServerConfig;
pub use connection::{Connection, Transport};
pub use handler::Handler;
pub use handoff::Handoff;
pub use spawn::{OsSpawner, ThreadMain, ThreadSpawner};
pub use worker::{current_worker_id, WorkerId};
pub use pool::{Pool, PoolStats, Rejected};
pub use listener::{ListenAddr, Listener};
pub use acceptor::{AcceptOutcome, Acceptor};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(unix)] {
        // poll(2), accept(2) and AF_UNIX are all we need.
    } else {
        compile_error!("Unsupported platform");
    }
}
