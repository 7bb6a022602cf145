//! Worker pool: reuse-or-spawn dispatch and the idle cache
//!
//! All bookkeeping lives in one [`PoolState`] behind one mutex. Workers are
//! addressed by [`WorkerId`]; the state keeps the live records in a map, the
//! idle ids in a LIFO stack and the busy ids in a set. The lock is held only
//! for O(1) bookkeeping plus the handoff signal, never across a handler.
//!
//! ```text
//!  dispatch(conn)                      worker thread
//!  ──────────────                      ─────────────
//!  lock                                take()  <── blocks on its handoff
//!  idle.pop() or spawn                   │
//!  busy.insert(id)                       ▼
//!  handoff.offer(conn) ───────────────► handler(logger, conn)
//!  unlock                              close(conn)
//!                                      lock
//!                                      handoff.reset(); busy.remove(id)
//!                                      idle.len() < cache_limit ?
//!                                        push idle : retire (thread exits)
//!                                      unlock
//! ```
//!
//! `cache_limit` bounds idle retention only. A burst of connections can
//! create any number of busy workers; the limit decides how many survive
//! idle afterwards.

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::handler::Handler;
use crate::handoff::Handoff;
use crate::spawn::{OsSpawner, ThreadSpawner};
use crate::worker::{Completion, Worker, WorkerId};

use ss_core::error::invariant_violated;
use ss_core::{io_errno, ss_debug, ss_error, ss_invariant, ss_trace, Logger, SsError, SsResult};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// A live worker as seen by the pool
struct WorkerRecord {
    handoff: Arc<Handoff>,
    thread: JoinHandle<()>,
}

/// Pool bookkeeping, guarded by the pool lock
struct PoolState {
    /// Every live worker, idle or busy
    workers: HashMap<WorkerId, WorkerRecord>,
    /// Idle workers, most recently parked last
    idle: Vec<WorkerId>,
    /// Workers whose handoff slot is occupied
    busy: HashSet<WorkerId>,
    cache_limit: usize,
    next_id: u64,
    spawned: u64,
    retired: u64,
    dispatched: u64,
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Workers parked in the idle cache
    pub idle: usize,
    /// Workers running (or about to run) a handler
    pub busy: usize,
    pub cache_limit: usize,
    /// Worker threads ever started
    pub spawned: u64,
    /// Worker threads that exited because the idle cache was full
    pub retired: u64,
    /// Connections handed to a worker
    pub dispatched: u64,
}

impl PoolStats {
    #[inline]
    pub fn live(&self) -> usize {
        self.idle + self.busy
    }
}

/// State shared between the pool handle and its worker threads
pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) logger: Arc<Logger>,
    spawner: Box<dyn ThreadSpawner>,
    worker_name: String,
}

impl PoolShared {
    // Every mutation below either completes or aborts the process, so a
    // poisoned lock never guards half-updated state.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new worker thread and register it (caller holds the lock)
    fn spawn_worker(self: &Arc<Self>, state: &mut PoolState) -> SsResult<WorkerId> {
        let id = WorkerId::new(state.next_id);
        state.next_id += 1;

        let handoff = Arc::new(Handoff::new());
        let worker = Worker::new(id, Arc::clone(&handoff), Arc::clone(self));
        let name = format!("{}-{}", self.worker_name, id.as_u64());

        let thread = self
            .spawner
            .spawn(name, Box::new(move || worker.run()))
            .map_err(|e| SsError::Spawn(io_errno(&e)))?;

        state.workers.insert(id, WorkerRecord { handoff, thread });
        state.spawned += 1;
        Ok(id)
    }

    fn dispatch(self: &Arc<Self>, conn: Connection) -> Result<(), Rejected> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let (id, fresh) = match state.idle.pop() {
            Some(id) => (id, false),
            None => match self.spawn_worker(state) {
                Ok(id) => (id, true),
                Err(error) => {
                    drop(guard);
                    ss_error!(self.logger, "failed to allocate worker: {}", error);
                    return Err(Rejected { connection: conn, error });
                }
            },
        };

        ss_invariant!(state.busy.insert(id), "{} dispatched while already busy", id);
        let Some(record) = state.workers.get(&id) else {
            invariant_violated(format_args!("{} dispatched but not registered", id))
        };
        // Offer under the pool lock: completion handling takes the same lock,
        // so it can never observe a busy worker with an empty slot.
        record.handoff.offer(conn);
        state.dispatched += 1;
        drop(guard);

        if fresh {
            ss_debug!(self.logger, "new worker spawned: {}", id);
        }
        Ok(())
    }

    /// Called by a worker after its handler returned and the connection closed
    pub(crate) fn complete(&self, id: WorkerId) -> Completion {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(record) = state.workers.get(&id) else {
            invariant_violated(format_args!("{} completed but not registered", id))
        };
        record.handoff.reset();
        ss_invariant!(state.busy.remove(&id), "{} completed while not busy", id);

        let idle_after = state.idle.len() + 1;
        let cache_limit = state.cache_limit;
        let (completion, retired) = if state.idle.len() < cache_limit {
            state.idle.push(id);
            (Completion::Recycle, None)
        } else {
            state.retired += 1;
            (Completion::Retire, state.workers.remove(&id))
        };
        drop(guard);

        // Logged outside the lock: the sink is user code of unbounded cost.
        match retired {
            None => ss_trace!(self.logger, "{} recycled (idle={})", id, idle_after),
            Some(record) => ss_trace!(
                self.logger,
                "{} retired ({}, idle cache full at {})",
                id,
                record.thread.thread().name().unwrap_or("unnamed"),
                cache_limit
            ),
        }
        completion
    }

    /// Check the bookkeeping invariants while holding the pool lock
    ///
    /// Every live worker is exactly one of idle or busy, and a worker is busy
    /// exactly when its handoff slot is occupied.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let state = self.lock();
        assert_eq!(state.idle.len() + state.busy.len(), state.workers.len());
        for id in &state.idle {
            assert!(!state.busy.contains(id), "{id} both idle and busy");
        }
        for (id, record) in &state.workers {
            assert_eq!(
                state.busy.contains(id),
                !record.handoff.is_empty(),
                "{id}: busy flag disagrees with its handoff slot"
            );
        }
    }
}

/// Connection the pool could not place; the caller must close it
pub struct Rejected {
    pub connection: Connection,
    pub error: SsError,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("connection", &self.connection)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dispatch rejected: {}", self.error)
    }
}

impl std::error::Error for Rejected {}

/// Handle to a worker pool; cheap to clone
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Pool with OS threads sized and named from `config`
    pub fn new(config: &ServerConfig, handler: Arc<dyn Handler>, logger: Arc<Logger>) -> Self {
        let spawner = OsSpawner::new(config.worker_stack_size);
        Self::with_spawner(config, handler, logger, Box::new(spawner))
    }

    /// Pool that starts workers through a custom spawner
    pub fn with_spawner(
        config: &ServerConfig,
        handler: Arc<dyn Handler>,
        logger: Arc<Logger>,
        spawner: Box<dyn ThreadSpawner>,
    ) -> Self {
        let state = PoolState {
            workers: HashMap::new(),
            idle: Vec::new(),
            busy: HashSet::new(),
            cache_limit: config.cache_limit,
            next_id: 0,
            spawned: 0,
            retired: 0,
            dispatched: 0,
        };
        Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(state),
                handler,
                logger,
                spawner,
                worker_name: config.worker_name.clone(),
            }),
        }
    }

    /// Hand `conn` to an idle worker, or to a freshly spawned one
    ///
    /// Never waits for a handler. On failure the connection comes back in
    /// [`Rejected`] and nothing was added to the pool.
    pub fn dispatch(&self, conn: Connection) -> Result<(), Rejected> {
        self.shared.dispatch(conn)
    }

    /// Change the idle retention bound
    ///
    /// Only later completions consult the new value; idle workers above a
    /// lowered limit stay cached.
    pub fn set_cache_limit(&self, n: usize) {
        self.shared.lock().cache_limit = n;
    }

    pub fn cache_limit(&self) -> usize {
        self.shared.lock().cache_limit
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        debug_assert_eq!(state.idle.len() + state.busy.len(), state.workers.len());
        PoolStats {
            idle: state.idle.len(),
            busy: state.busy.len(),
            cache_limit: state.cache_limit,
            spawned: state.spawned,
            retired: state.retired,
            dispatched: state.dispatched,
        }
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.shared.logger
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("stats", &self.stats()).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
