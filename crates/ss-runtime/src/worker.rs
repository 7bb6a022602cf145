//! Worker threads
//!
//! A worker is one OS thread plus its private [`Handoff`] slot. It runs
//! `take -> handler -> close -> complete` until the pool tells it to retire.
//! Workers are created on demand by the pool and never pre-spawned.

use crate::handoff::Handoff;
use crate::pool::PoolShared;
use ss_core::ss_error;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Stable identity of a worker within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// What a worker does after finishing a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Parked in the idle cache, waits for the next job
    Recycle,
    /// Idle cache was full; the thread exits
    Retire,
}

/// State moved onto the worker's thread
pub(crate) struct Worker {
    id: WorkerId,
    handoff: Arc<Handoff>,
    pool: Arc<PoolShared>,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, handoff: Arc<Handoff>, pool: Arc<PoolShared>) -> Self {
        Self { id, handoff, pool }
    }

    /// Thread main loop
    pub(crate) fn run(self) {
        set_current_worker_id(Some(self.id));

        loop {
            let mut conn = self.handoff.take();

            let handler = &self.pool.handler;
            let logger = &*self.pool.logger;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(logger, &mut conn)));
            if outcome.is_err() {
                ss_error!(logger, "{}: handler panicked, closing {:?}", self.id, conn);
            }

            // Close before going back to the pool; the handler may not keep it.
            drop(conn);

            match self.pool.complete(self.id) {
                Completion::Recycle => continue,
                Completion::Retire => break,
            }
        }

        set_current_worker_id(None);
    }
}

thread_local! {
    static CURRENT_WORKER_ID: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

fn set_current_worker_id(id: Option<WorkerId>) {
    CURRENT_WORKER_ID.with(|cell| cell.set(id));
}

/// Id of the worker running on this thread, `None` outside worker threads
#[inline]
pub fn current_worker_id() -> Option<WorkerId> {
    CURRENT_WORKER_ID.with(|cell| cell.get())
}
