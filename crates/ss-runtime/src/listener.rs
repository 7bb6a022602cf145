//! Listening sockets for TCP endpoints and local socket paths
//!
//! `Listener::bind` does the whole setup: socket, options, bind, listen
//! with the configured backlog, then non-blocking mode for the acceptor's
//! readiness loop. Any failure closes the socket before returning, so a
//! caller never holds a half-configured listener.
//!
//! ```ignore
//! let addr: ListenAddr = "127.0.0.1:1234".parse()?;
//! let listener = Listener::bind(&addr, 128)?;
//!
//! let local: ListenAddr = "unix:/tmp/ss.sock".parse()?;
//! let listener = Listener::bind(&local, 128)?;
//! ```

use crate::connection::{Connection, Transport};
use ss_core::{io_errno, ListenError, SsResult};

use nix::sys::socket::{self, sockopt, AddressFamily, Backlog, SockFlag, SockType};
use nix::sys::socket::{SockaddrIn, SockaddrIn6, UnixAddr};

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where a listener binds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// IPv4 or IPv6 address plus port
    Tcp(SocketAddr),
    /// Local (Unix-domain) socket path
    Local(PathBuf),
}

impl ListenAddr {
    pub fn transport(&self) -> Transport {
        match self {
            ListenAddr::Tcp(_) => Transport::Tcp,
            ListenAddr::Local(_) => Transport::Local,
        }
    }
}

impl From<SocketAddr> for ListenAddr {
    fn from(addr: SocketAddr) -> Self {
        ListenAddr::Tcp(addr)
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
            ListenAddr::Local(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Accepts `host:port`, `[v6]:port`, `unix:/path`, or an absolute path
impl FromStr for ListenAddr {
    type Err = ListenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ListenError::Address("empty address".to_string()));
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ListenError::Address("empty socket path".to_string()));
            }
            return Ok(ListenAddr::Local(PathBuf::from(path)));
        }
        if s.starts_with('/') {
            return Ok(ListenAddr::Local(PathBuf::from(s)));
        }
        s.parse::<SocketAddr>()
            .map(ListenAddr::Tcp)
            .map_err(|e| ListenError::Address(format!("{}: {}", s, e)))
    }
}

/// A bound, listening, non-blocking socket
pub enum Listener {
    Tcp(TcpListener),
    Local { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Create, bind and listen on `addr`
    pub fn bind(addr: &ListenAddr, backlog: i32) -> SsResult<Self> {
        let backlog = Backlog::new(backlog)
            .map_err(|e| ListenError::Address(format!("backlog {}: {}", backlog, e)))?;

        let listener = match addr {
            ListenAddr::Tcp(sa) => {
                let fd = bind_tcp(sa, backlog)?;
                Listener::Tcp(TcpListener::from(fd))
            }
            ListenAddr::Local(path) => {
                remove_stale_socket(path)?;
                let fd = bind_local(path, backlog)?;
                Listener::Local {
                    listener: UnixListener::from(fd),
                    path: path.clone(),
                }
            }
        };

        // On error `listener` drops here, closing the socket (and unlinking the path).
        listener
            .set_nonblocking()
            .map_err(|e| ListenError::NonBlocking(io_errno(&e)))?;
        Ok(listener)
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Listener::Tcp(l) => l.set_nonblocking(true),
            Listener::Local { listener, .. } => listener.set_nonblocking(true),
        }
    }

    /// One accept attempt; `WouldBlock` when nothing is pending
    pub fn accept(&self) -> io::Result<Connection> {
        match self {
            Listener::Tcp(l) => l.accept().map(|(stream, _peer)| Connection::Tcp(stream)),
            Listener::Local { listener, .. } => {
                listener.accept().map(|(stream, _peer)| Connection::Local(stream))
            }
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            Listener::Tcp(_) => Transport::Tcp,
            Listener::Local { .. } => Transport::Local,
        }
    }

    /// Actual bound address (resolves port 0)
    pub fn local_addr(&self) -> io::Result<ListenAddr> {
        match self {
            Listener::Tcp(l) => l.local_addr().map(ListenAddr::Tcp),
            Listener::Local { path, .. } => Ok(ListenAddr::Local(path.clone())),
        }
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Listener::Tcp(l) => l.as_fd(),
            Listener::Local { listener, .. } => listener.as_fd(),
        }
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.as_fd().as_raw_fd()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Local { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("transport", &self.transport())
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

// ============================================================================
// Socket setup
// ============================================================================

fn stream_flags() -> SockFlag {
    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
            SockFlag::SOCK_CLOEXEC
        } else {
            SockFlag::empty()
        }
    }
}

fn bind_tcp(addr: &SocketAddr, backlog: Backlog) -> Result<OwnedFd, ListenError> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let fd = socket::socket(family, SockType::Stream, stream_flags(), None)
        .map_err(|e| ListenError::Socket(e as i32))?;

    socket::setsockopt(&fd, sockopt::ReuseAddr, &true)
        .map_err(|e| ListenError::SetOption(e as i32))?;

    let bound = match addr {
        SocketAddr::V4(v4) => socket::bind(fd.as_raw_fd(), &SockaddrIn::from(*v4)),
        SocketAddr::V6(v6) => socket::bind(fd.as_raw_fd(), &SockaddrIn6::from(*v6)),
    };
    bound.map_err(|e| ListenError::Bind(e as i32))?;

    socket::listen(&fd, backlog).map_err(|e| ListenError::Listen(e as i32))?;
    Ok(fd)
}

fn bind_local(path: &Path, backlog: Backlog) -> Result<OwnedFd, ListenError> {
    let addr = UnixAddr::new(path)
        .map_err(|e| ListenError::Address(format!("{}: {}", path.display(), e)))?;

    let fd = socket::socket(AddressFamily::Unix, SockType::Stream, stream_flags(), None)
        .map_err(|e| ListenError::Socket(e as i32))?;

    socket::bind(fd.as_raw_fd(), &addr).map_err(|e| ListenError::Bind(e as i32))?;

    if let Err(e) = socket::listen(&fd, backlog) {
        let _ = std::fs::remove_file(path);
        return Err(ListenError::Listen(e as i32));
    }
    Ok(fd)
}

/// Remove a leftover socket file from an earlier run; refuse anything else
///
/// A socket file is only stale if nothing accepts on it any more. A live
/// server keeps its path and this bind fails with `EADDRINUSE`.
fn remove_stale_socket(path: &Path) -> Result<(), ListenError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => match UnixStream::connect(path) {
            Ok(_) => Err(ListenError::Bind(libc::EADDRINUSE)),
            Err(e) if e.raw_os_error() == Some(libc::ECONNREFUSED) => std::fs::remove_file(path)
                .map_err(|e| ListenError::Address(format!("{}: {}", path.display(), e))),
            Err(e) => Err(ListenError::Address(format!("{}: {}", path.display(), e))),
        },
        Ok(_) => Err(ListenError::Address(format!(
            "{}: exists and is not a socket",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ListenError::Address(format!("{}: {}", path.display(), e))),
    }
}
