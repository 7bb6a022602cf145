//! Leveled, lockable logger shared by the acceptor and every worker
//!
//! Each [`Logger`] carries a severity threshold and a pluggable sink behind
//! one mutex. A message is emitted only when its level is numerically less
//! than or equal to the threshold, and the whole sink call happens under the
//! lock, so concurrent emissions never interleave.
//!
//! # Environment Variables
//!
//! - `SS_LOG_LEVEL=<level>` - Threshold: 0=fatal, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `SS_FLUSH_EPRINT=1` - Flush stderr after each line (useful for debugging crashes)
//!
//! # Usage
//!
//! ```ignore
//! use ss_core::logger::{Logger, LogLevel};
//! use ss_core::{ss_info, ss_debug};
//!
//! let logger = Logger::new(LogLevel::Debug);
//! ss_info!(logger, "listening on {}", addr);
//! ss_debug!(logger, "worker {} spawned", id);
//! ```

use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::env::{env_get_bool, env_get_opt, LOG_FLUSH_ENV, LOG_LEVEL_ENV};

/// Log levels, most severe first
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Fatal = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Fatal,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Fatal => "[FATAL]",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Error returned when a log level name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError;

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level")
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fatal" | "0" => Ok(LogLevel::Fatal),
            "error" | "err" | "1" => Ok(LogLevel::Error),
            "warn" | "warning" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(ParseLevelError),
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for log lines that passed the threshold
///
/// Called with the logger lock held; an implementation never sees two
/// emissions at once.
pub trait LogSink: Send {
    fn write(&mut self, level: LogLevel, args: fmt::Arguments<'_>);
}

/// Sink backed by a closure, built with [`sink_fn`]
pub struct FnSink<F> {
    f: F,
}

/// Wrap a closure as a [`LogSink`]
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(LogLevel, fmt::Arguments<'_>) + Send,
{
    FnSink { f }
}

impl<F> LogSink for FnSink<F>
where
    F: FnMut(LogLevel, fmt::Arguments<'_>) + Send,
{
    fn write(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
        (self.f)(level, args)
    }
}

/// Default sink: `<prefix> <message>` lines on standard error
#[derive(Debug, Default)]
pub struct StderrSink {
    flush: bool,
}

impl StderrSink {
    pub fn new(flush: bool) -> Self {
        Self { flush }
    }
}

impl LogSink for StderrSink {
    fn write(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = write!(handle, "{} ", level.prefix());
        let _ = handle.write_fmt(args);
        let _ = handle.write_all(b"\n");
        if self.flush {
            let _ = handle.flush();
        }
    }
}

/// Sink over any writer (a file, a pipe, an in-memory buffer)
pub struct WriterSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn write(&mut self, level: LogLevel, args: fmt::Arguments<'_>) {
        let _ = write!(self.writer, "{} ", level.prefix());
        let _ = self.writer.write_fmt(args);
        let _ = self.writer.write_all(b"\n");
        let _ = self.writer.flush();
    }
}

// ============================================================================
// Logger
// ============================================================================

struct LoggerInner {
    threshold: LogLevel,
    sink: Box<dyn LogSink>,
}

/// Leveled logger with a runtime-settable threshold and sink
pub struct Logger {
    inner: Mutex<LoggerInner>,
}

impl Logger {
    /// Logger writing to stderr with the given threshold
    pub fn new(threshold: LogLevel) -> Self {
        Self::with_sink(threshold, StderrSink::default())
    }

    pub fn with_sink<S: LogSink + 'static>(threshold: LogLevel, sink: S) -> Self {
        Self {
            inner: Mutex::new(LoggerInner {
                threshold,
                sink: Box::new(sink),
            }),
        }
    }

    /// Logger configured from `SS_LOG_LEVEL` and `SS_FLUSH_EPRINT`
    pub fn from_env() -> Self {
        let threshold = env_get_opt::<LogLevel>(LOG_LEVEL_ENV).unwrap_or_default();
        let flush = env_get_bool(LOG_FLUSH_ENV, false);
        Self::with_sink(threshold, StderrSink::new(flush))
    }

    // A sink that panicked mid-write must not silence every later caller.
    fn lock(&self) -> MutexGuard<'_, LoggerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit `args` if `level` is at or above the threshold's severity
    ///
    /// A panicking sink loses the line; the panic never reaches the caller.
    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let mut inner = self.lock();
        if level <= inner.threshold {
            let sink = &mut inner.sink;
            let _ = panic::catch_unwind(AssertUnwindSafe(|| sink.write(level, args)));
        }
    }

    #[inline]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.lock().threshold
    }

    pub fn threshold(&self) -> LogLevel {
        self.lock().threshold
    }

    pub fn set_threshold(&self, level: LogLevel) {
        self.lock().threshold = level;
    }

    /// Replace the sink; later `log` calls use the new one
    pub fn set_sink<S: LogSink + 'static>(&self, sink: S) {
        self.lock().sink = Box::new(sink);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("threshold", &self.threshold())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Generic leveled log: `ss_log!(logger, LogLevel::Info, "x={}", x)`
#[macro_export]
macro_rules! ss_log {
    ($logger:expr, $level:expr, $($arg:tt)*) => {{
        $logger.log($level, format_args!($($arg)*));
    }};
}

/// Fatal level log (always shown)
#[macro_export]
macro_rules! ss_fatal {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.log($crate::logger::LogLevel::Fatal, format_args!($($arg)*));
    }};
}

/// Error level log
#[macro_export]
macro_rules! ss_error {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.log($crate::logger::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log
#[macro_export]
macro_rules! ss_warn {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.log($crate::logger::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log
#[macro_export]
macro_rules! ss_info {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.log($crate::logger::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log
#[macro_export]
macro_rules! ss_debug {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.log($crate::logger::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ss_trace {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.log($crate::logger::LogLevel::Trace, format_args!($($arg)*));
    }};
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn collecting(threshold: LogLevel) -> (Logger, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        let logger = Logger::with_sink(threshold, sink_fn(move |level, args| {
            sink_lines.lock().unwrap().push(format!("{} {}", level.prefix(), args));
        }));
        (logger, lines)
    }

    #[test]
    fn test_log_levels() {
        assert!(LogLevel::Fatal < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(LogLevel::Fatal as u8, 0);
        assert_eq!(LogLevel::Trace as u8, 5);
    }

    #[test]
    fn test_level_from_u8() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Fatal);
        assert_eq!(LogLevel::from_u8(1), LogLevel::Error);
        assert_eq!(LogLevel::from_u8(4), LogLevel::Debug);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("ERROR".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert_eq!("2".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" trace ".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Warn.to_string().parse::<LogLevel>(), Ok(LogLevel::Warn));
    }

    #[test]
    fn test_threshold_filters() {
        let (logger, lines) = collecting(LogLevel::Error);

        ss_debug!(logger, "hidden {}", 4);
        ss_info!(logger, "hidden too");
        ss_error!(logger, "shown {}", 1);
        ss_fatal!(logger, "fatal shown");

        let lines = lines.lock().unwrap();
        assert_eq!(lines.as_slice(), ["[ERROR] shown 1", "[FATAL] fatal shown"]);
    }

    #[test]
    fn test_set_threshold_affects_later_calls() {
        let (logger, lines) = collecting(LogLevel::Error);

        ss_debug!(logger, "before");
        logger.set_threshold(LogLevel::Debug);
        assert!(logger.enabled(LogLevel::Debug));
        assert!(!logger.enabled(LogLevel::Trace));
        ss_debug!(logger, "after");

        assert_eq!(lines.lock().unwrap().as_slice(), ["[DEBUG] after"]);
    }

    #[test]
    fn test_set_sink_redirects() {
        let (logger, first) = collecting(LogLevel::Info);
        ss_info!(logger, "one");

        let second = Arc::new(Mutex::new(Vec::new()));
        let sink_second = Arc::clone(&second);
        logger.set_sink(sink_fn(move |_, args| {
            sink_second.lock().unwrap().push(args.to_string());
        }));
        ss_info!(logger, "two");

        assert_eq!(first.lock().unwrap().as_slice(), ["[INFO]  one"]);
        assert_eq!(second.lock().unwrap().as_slice(), ["two"]);
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let calls = Arc::new(Mutex::new(0usize));
        let sink_calls = Arc::clone(&calls);
        let logger = Logger::with_sink(LogLevel::Trace, sink_fn(move |level, _| {
            *sink_calls.lock().unwrap() += 1;
            if level == LogLevel::Trace {
                panic!("sink refuses trace");
            }
        }));

        ss_trace!(logger, "dropped");
        ss_info!(logger, "still delivered");
        ss_trace!(logger, "dropped again");

        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(logger.threshold(), LogLevel::Trace);
    }

    #[test]
    fn test_writer_sink_format() {
        let buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let logger = Logger::with_sink(LogLevel::Warn, WriterSink::new(Shared(Arc::clone(&buf))));
        ss_warn!(logger, "disk {}% full", 91);
        ss_info!(logger, "ignored");

        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "[WARN]  disk 91% full\n");
    }

    #[test]
    fn test_concurrent_lines_never_interleave() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        // Writes one char at a time and yields in between, so any missing
        // serialization shows up as a torn line.
        let out = Arc::new(Mutex::new(String::new()));
        let sink_out = Arc::clone(&out);
        let logger = Arc::new(Logger::with_sink(
            LogLevel::Info,
            sink_fn(move |_, args| {
                let msg = args.to_string();
                for ch in msg.chars().chain(std::iter::once('\n')) {
                    sink_out.lock().unwrap().push(ch);
                    thread::yield_now();
                }
            }),
        ));

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let logger = Arc::clone(&logger);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        ss_info!(logger, "thread-{}-line-{}-end", t, i);
                        ss_debug!(logger, "filtered-{}", i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let out = out.lock().unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), THREADS * PER_THREAD);
        for line in lines {
            assert!(line.starts_with("thread-"), "torn line: {line:?}");
            assert!(line.ends_with("-end"), "torn line: {line:?}");
            assert_eq!(line.matches("thread-").count(), 1, "torn line: {line:?}");
        }
    }

    #[test]
    fn test_macros_compile() {
        let logger = Logger::new(LogLevel::Fatal);
        logger.set_sink(sink_fn(|_, _| {}));

        ss_log!(logger, LogLevel::Info, "generic {}", 1);
        ss_fatal!(logger, "fatal");
        ss_error!(logger, "error {}", "msg");
        ss_warn!(logger, "warn");
        ss_info!(logger, "info");
        ss_debug!(logger, "debug");
        ss_trace!(logger, "trace");
    }
}
