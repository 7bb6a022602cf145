//! Readiness-driven accept loop
//!
//! Runs on one thread and watches exactly one listening descriptor. Each
//! iteration:
//! 1. Blocks in `poll()` until a connection is pending
//! 2. Makes one accept attempt
//! 3. Switches the new connection to blocking mode
//! 4. Hands it to the pool; a rejected connection is closed here
//!
//! Accept and dispatch failures are logged and the loop goes on. The only
//! suspension point is the readiness wait.

use crate::listener::Listener;
use crate::pool::{Pool, Rejected};

use ss_core::{io_errno, ss_error, ss_trace, SsError, SsResult};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use std::io;
use std::os::fd::AsFd;
use std::time::Duration;

/// Result of one acceptor iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The wait timed out or was interrupted; nothing was accepted
    Idle,
    /// Readiness was reported but another acceptor got the connection first
    Spurious,
    /// A connection was accepted and handed to a worker
    Dispatched,
    /// A connection was accepted but then closed without being served
    Dropped(SsError),
    /// accept() itself failed
    AcceptFailed(SsError),
}

/// Accept loop over one listener feeding one pool
pub struct Acceptor<'a> {
    listener: &'a Listener,
    pool: &'a Pool,
}

impl<'a> Acceptor<'a> {
    pub fn new(listener: &'a Listener, pool: &'a Pool) -> Self {
        Self { listener, pool }
    }

    /// Serve forever
    ///
    /// Returns only if the readiness wait itself fails with something other
    /// than an interrupt, which means the listening descriptor is unusable.
    pub fn run(&self) -> SsError {
        loop {
            if let Err(e) = self.poll_once(None) {
                ss_error!(self.pool.logger(), "acceptor stopped: {}", e);
                return e;
            }
        }
    }

    /// One readiness wait plus at most one accept and dispatch
    ///
    /// `timeout = None` waits indefinitely.
    pub fn poll_once(&self, timeout: Option<Duration>) -> SsResult<AcceptOutcome> {
        if !self.wait_readable(timeout)? {
            return Ok(AcceptOutcome::Idle);
        }
        Ok(self.accept_one())
    }

    /// Block until the listener reports a pending connection
    fn wait_readable(&self, timeout: Option<Duration>) -> SsResult<bool> {
        let timeout = poll_timeout(timeout);
        let mut fds = [PollFd::new(self.listener.as_fd(), PollFlags::POLLIN)];

        match poll(&mut fds, timeout) {
            Ok(0) => Ok(false),
            Ok(_) => Ok(fds[0].revents().map_or(false, |r| !r.is_empty())),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(SsError::Poll(e as i32)),
        }
    }

    fn accept_one(&self) -> AcceptOutcome {
        let logger = self.pool.logger();

        let conn = match self.listener.accept() {
            Ok(conn) => conn,
            Err(e) if is_transient(&e) => {
                ss_trace!(logger, "accept: nothing pending ({})", e);
                return AcceptOutcome::Spurious;
            }
            Err(e) => {
                let err = SsError::Accept(io_errno(&e));
                ss_error!(logger, "{}", err);
                return AcceptOutcome::AcceptFailed(err);
            }
        };

        if let Err(e) = conn.set_blocking() {
            let err = SsError::Blocking(io_errno(&e));
            ss_error!(logger, "{}, dropping {:?}", err, conn);
            conn.close();
            return AcceptOutcome::Dropped(err);
        }

        match self.pool.dispatch(conn) {
            Ok(()) => AcceptOutcome::Dispatched,
            Err(Rejected { connection, error }) => {
                ss_error!(logger, "failed to dispatch {:?}: {}", connection, error);
                connection.close();
                AcceptOutcome::Dropped(error)
            }
        }
    }
}

/// Millisecond poll timeout, rounded up so a sub-millisecond wait still
/// blocks, and clamped to the largest timeout poll() accepts
fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    let Some(d) = timeout else {
        return PollTimeout::NONE;
    };
    let ms = i32::try_from(d.as_nanos().div_ceil(1_000_000)).unwrap_or(i32::MAX);
    PollTimeout::try_from(ms).unwrap_or(PollTimeout::MAX)
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
