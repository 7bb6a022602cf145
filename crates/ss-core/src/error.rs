//! Error types for the ss server

use core::fmt;
use std::io::Write;

/// Result type for server operations
pub type SsResult<T> = Result<T, SsError>;

/// Errors surfaced by the pool, the listener and the acceptor
///
/// OS failures carry the raw errno so callers can match on it without
/// holding an `io::Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsError {
    /// Worker thread could not be started (resource exhaustion)
    Spawn(i32),

    /// Listener setup failed
    Listen(ListenError),

    /// accept() on the listening descriptor failed
    Accept(i32),

    /// The readiness wait itself failed
    Poll(i32),

    /// Switching an accepted connection to blocking mode failed
    Blocking(i32),

    /// Configuration rejected by validation
    InvalidConfig(&'static str),
}

impl SsError {
    /// Raw errno, when the error came from the OS
    pub fn errno(&self) -> Option<i32> {
        match self {
            SsError::Spawn(e) | SsError::Accept(e) | SsError::Poll(e) | SsError::Blocking(e) => {
                Some(*e)
            }
            SsError::Listen(l) => l.errno(),
            SsError::InvalidConfig(_) => None,
        }
    }
}

impl fmt::Display for SsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsError::Spawn(e) => write!(f, "failed to start worker thread: {}", errno_str(*e)),
            SsError::Listen(e) => write!(f, "listener setup failed: {}", e),
            SsError::Accept(e) => write!(f, "accept failed: {}", errno_str(*e)),
            SsError::Poll(e) => write!(f, "readiness wait failed: {}", errno_str(*e)),
            SsError::Blocking(e) => {
                write!(f, "failed to make connection blocking: {}", errno_str(*e))
            }
            SsError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for SsError {}

/// Listener setup step that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    /// socket() failed
    Socket(i32),

    /// setsockopt() failed
    SetOption(i32),

    /// bind() failed
    Bind(i32),

    /// listen() failed
    Listen(i32),

    /// Toggling non-blocking mode failed
    NonBlocking(i32),

    /// Address could not be used (unparsable, path too long, stale file not removable)
    Address(String),
}

impl ListenError {
    pub fn errno(&self) -> Option<i32> {
        match self {
            ListenError::Socket(e)
            | ListenError::SetOption(e)
            | ListenError::Bind(e)
            | ListenError::Listen(e)
            | ListenError::NonBlocking(e) => Some(*e),
            ListenError::Address(_) => None,
        }
    }
}

impl fmt::Display for ListenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenError::Socket(e) => write!(f, "socket: {}", errno_str(*e)),
            ListenError::SetOption(e) => write!(f, "setsockopt: {}", errno_str(*e)),
            ListenError::Bind(e) => write!(f, "bind: {}", errno_str(*e)),
            ListenError::Listen(e) => write!(f, "listen: {}", errno_str(*e)),
            ListenError::NonBlocking(e) => write!(f, "set non-blocking: {}", errno_str(*e)),
            ListenError::Address(msg) => write!(f, "address: {}", msg),
        }
    }
}

impl From<ListenError> for SsError {
    fn from(e: ListenError) -> Self {
        SsError::Listen(e)
    }
}

/// errno of an `io::Error`, or 0 when it did not come from the OS
#[inline]
pub fn io_errno(e: &std::io::Error) -> i32 {
    e.raw_os_error().unwrap_or(0)
}

fn errno_str(errno: i32) -> String {
    if errno == 0 {
        return "unknown error".to_string();
    }
    std::io::Error::from_raw_os_error(errno).to_string()
}

// ============================================================================
// Invariant violations
// ============================================================================

/// Report a broken pool invariant and abort the process
///
/// Continuing would risk handing one connection to two workers or reusing a
/// retired worker. Bypasses any `Logger` because its lock may be held.
#[cold]
pub fn invariant_violated(args: fmt::Arguments<'_>) -> ! {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "[FATAL] invariant violated: ");
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    let _ = handle.flush();
    std::process::abort()
}

/// Abort the process unless `cond` holds
#[macro_export]
macro_rules! ss_invariant {
    ($cond:expr, $($arg:tt)*) => {{
        if !$cond {
            $crate::error::invariant_violated(format_args!($($arg)*));
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = SsError::InvalidConfig("backlog must be positive");
        assert_eq!(format!("{}", e), "invalid configuration: backlog must be positive");

        let e = SsError::Listen(ListenError::Address("empty".to_string()));
        assert_eq!(format!("{}", e), "listener setup failed: address: empty");

        let e = SsError::Spawn(0);
        assert_eq!(format!("{}", e), "failed to start worker thread: unknown error");
    }

    #[test]
    fn test_error_conversion() {
        let listen_err = ListenError::Bind(98);
        let err: SsError = listen_err.into();
        assert!(matches!(err, SsError::Listen(ListenError::Bind(98))));
        assert_eq!(err.errno(), Some(98));
        assert_eq!(SsError::InvalidConfig("x").errno(), None);
    }

    #[test]
    fn test_io_errno() {
        let e = std::io::Error::from_raw_os_error(11);
        assert_eq!(io_errno(&e), 11);
        let e = std::io::Error::new(std::io::ErrorKind::Other, "synthetic");
        assert_eq!(io_errno(&e), 0);
    }

    #[test]
    fn test_invariant_holds_is_noop() {
        ss_invariant!(1 + 1 == 2, "arithmetic broke");
    }
}
