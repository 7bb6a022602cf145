//! Accepted connection handle
//!
//! Owns the per-connection descriptor. Dropping a `Connection` closes it;
//! the worker drops it as soon as the handler returns.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;

/// Transport a connection (or listener) runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Local,
}

/// One accepted client connection
pub enum Connection {
    Tcp(TcpStream),
    Local(UnixStream),
}

impl Connection {
    pub fn transport(&self) -> Transport {
        match self {
            Connection::Tcp(_) => Transport::Tcp,
            Connection::Local(_) => Transport::Local,
        }
    }

    /// Switch to blocking I/O; handlers are written for blocking semantics
    pub fn set_blocking(&self) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.set_nonblocking(false),
            Connection::Local(s) => s.set_nonblocking(false),
        }
    }

    /// Shut down one or both directions without closing the descriptor
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.shutdown(how),
            Connection::Local(s) => s.shutdown(how),
        }
    }

    /// Close the descriptor now
    pub fn close(self) {
        drop(self);
    }
}

impl From<TcpStream> for Connection {
    fn from(s: TcpStream) -> Self {
        Connection::Tcp(s)
    }
}

impl From<UnixStream> for Connection {
    fn from(s: UnixStream) -> Self {
        Connection::Local(s)
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.read(buf),
            Connection::Local(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.write(buf),
            Connection::Local(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.flush(),
            Connection::Local(s) => s.flush(),
        }
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Connection::Tcp(s) => s.as_fd(),
            Connection::Local(s) => s.as_fd(),
        }
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.as_fd().as_raw_fd()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport())
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}
