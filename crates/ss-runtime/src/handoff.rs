//! Single-slot handoff between the dispatcher and one worker
//!
//! The slot moves through `Empty -> Pending -> Running -> Empty` once per
//! job. The dispatcher fills it (`offer`), the worker claims it (`take`) and
//! clears it when the job is finished (`reset`). Anything other than `Empty`
//! means the worker is busy, so a second `offer` before `reset` is a broken
//! pool invariant and aborts the process.

use crate::connection::Connection;
use ss_core::ss_invariant;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

enum Slot {
    /// No job; the worker is idle or about to park
    Empty,
    /// A connection is waiting for the worker to pick it up
    Pending(Connection),
    /// The worker took the connection and is running the handler
    Running,
}

impl Slot {
    fn name(&self) -> &'static str {
        match self {
            Slot::Empty => "empty",
            Slot::Pending(_) => "pending",
            Slot::Running => "running",
        }
    }
}

/// Condvar-backed handoff cell owned by one worker
pub struct Handoff {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Handoff {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            ready: Condvar::new(),
        }
    }

    // The slot is only ever replaced wholesale, so a poisoned guard still
    // holds a consistent value.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a connection to the worker and wake it
    pub fn offer(&self, conn: Connection) {
        let mut slot = self.lock();
        ss_invariant!(
            matches!(*slot, Slot::Empty),
            "handoff offered a job while {}",
            slot.name()
        );
        *slot = Slot::Pending(conn);
        self.ready.notify_one();
    }

    /// Block until a connection is present, then claim it
    pub fn take(&self) -> Connection {
        let mut slot = self.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Running) {
                Slot::Pending(conn) => return conn,
                prev => {
                    *slot = prev;
                    slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Clear the slot after the claimed job finished
    pub fn reset(&self) {
        let mut slot = self.lock();
        ss_invariant!(
            matches!(*slot, Slot::Running),
            "handoff reset while {}",
            slot.name()
        );
        *slot = Slot::Empty;
    }

    /// True when no job is pending or running
    pub fn is_empty(&self) -> bool {
        matches!(*self.lock(), Slot::Empty)
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_aborted, child_case, run_child};
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_offer_take_reset() {
        let handoff = Handoff::new();
        assert!(handoff.is_empty());

        let (a, mut peer) = UnixStream::pair().unwrap();
        handoff.offer(Connection::from(a));
        assert!(!handoff.is_empty());

        let mut conn = handoff.take();
        assert!(!handoff.is_empty());
        conn.write_all(b"x").unwrap();
        drop(conn);
        handoff.reset();
        assert!(handoff.is_empty());

        let mut got = Vec::new();
        peer.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"x");
    }

    #[test]
    fn test_take_blocks_until_offer() {
        let handoff = Arc::new(Handoff::new());
        let h2 = Arc::clone(&handoff);

        let worker = thread::spawn(move || {
            let mut conn = h2.take();
            conn.write_all(b"taken").unwrap();
            drop(conn);
            h2.reset();
        });

        // Give the worker time to park on the empty slot
        thread::sleep(Duration::from_millis(50));
        assert!(handoff.is_empty());

        let (a, mut peer) = UnixStream::pair().unwrap();
        handoff.offer(Connection::from(a));
        worker.join().unwrap();

        let mut got = Vec::new();
        peer.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"taken");
        assert!(handoff.is_empty());
    }

    #[test]
    fn test_offer_before_take_is_not_lost() {
        let handoff = Arc::new(Handoff::new());
        let (a, _peer) = UnixStream::pair().unwrap();
        handoff.offer(Connection::from(a));

        let h2 = Arc::clone(&handoff);
        let worker = thread::spawn(move || {
            let _conn = h2.take();
        });
        worker.join().unwrap();
    }

    #[test]
    fn test_sequential_jobs() {
        let handoff = Arc::new(Handoff::new());
        let h2 = Arc::clone(&handoff);
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let worker = thread::spawn(move || {
            for _ in 0..3 {
                let mut conn = h2.take();
                let mut b = [0u8; 1];
                conn.read_exact(&mut b).unwrap();
                drop(conn);
                h2.reset();
                done_tx.send(b[0]).unwrap();
            }
        });

        for i in 0..3u8 {
            let (a, mut peer) = UnixStream::pair().unwrap();
            handoff.offer(Connection::from(a));
            peer.write_all(&[i]).unwrap();
            assert_eq!(done_rx.recv().unwrap(), i);
        }
        worker.join().unwrap();
    }

    #[test]
    fn test_double_offer_aborts() {
        if child_case().as_deref() == Some("double-offer") {
            let handoff = Handoff::new();
            let (a, _pa) = UnixStream::pair().unwrap();
            let (b, _pb) = UnixStream::pair().unwrap();
            handoff.offer(Connection::from(a));
            handoff.offer(Connection::from(b));
            return;
        }
        let output = run_child("handoff::tests::test_double_offer_aborts", "double-offer");
        assert_aborted(&output, "[FATAL] invariant violated: handoff offered a job while pending");
    }

    #[test]
    fn test_reset_of_empty_slot_aborts() {
        if child_case().as_deref() == Some("reset-empty") {
            Handoff::new().reset();
            return;
        }
        let output = run_child("handoff::tests::test_reset_of_empty_slot_aborts", "reset-empty");
        assert_aborted(&output, "[FATAL] invariant violated: handoff reset while empty");
    }
}
