//! # ss - Simple Server
//!
//! Thread-per-connection server with a bounded cache of reusable worker
//! threads.
//!
//! One acceptor thread waits for readiness on a listening socket, accepts a
//! connection and hands it to an idle worker, spawning a new worker when none
//! is idle. When the handler returns, the connection is closed and the worker
//! either parks in the idle cache or exits if the cache is full.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ss::{Server, Logger, Connection, ListenAddr, ss_info};
//! use std::io::Write;
//!
//! fn main() {
//!     let server = Server::new(|log: &Logger, conn: &mut Connection| {
//!         ss_info!(log, "Hello World");
//!         let _ = conn.write_all(b"Hello World\n");
//!     })
//!     .expect("invalid configuration");
//!
//!     let listener = server.listen(&"0.0.0.0:1234".parse().unwrap()).unwrap();
//!     let err = server.run(&listener);
//!     eprintln!("server stopped: {}", err);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────┐  readiness   ┌──────────┐  dispatch   ┌──────────────┐
//!   │ Listener │ ───────────▶ │ Acceptor │ ──────────▶ │     Pool     │
//!   └──────────┘              └──────────┘             │ idle: LIFO   │
//!                                                      │ busy: set    │
//!                                                      └──────┬───────┘
//!                                                             │ handoff
//!                                        ┌────────────────────┼──────────┐
//!                                        ▼                    ▼          ▼
//!                                   ┌────────┐           ┌────────┐  ┌────────┐
//!                                   │ Worker │           │ Worker │  │ Worker │
//!                                   └────────┘           └────────┘  └────────┘
//! ```

// Re-export core types
pub use ss_core::{
    constants, io_errno, sink_fn, FnSink, ListenError, LogLevel, LogSink, Logger, SsError,
    SsResult, StderrSink, WriterSink,
};

// Re-export logging macros
pub use ss_core::{ss_debug, ss_error, ss_fatal, ss_info, ss_log, ss_trace, ss_warn};

// Re-export env utilities
pub use ss_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use ss_runtime::{
    current_worker_id, AcceptOutcome, Acceptor, Connection, Handler, ListenAddr, Listener,
    OsSpawner, Pool, PoolStats, Rejected, ServerConfig, ThreadMain, ThreadSpawner, Transport,
    WorkerId,
};

use std::sync::Arc;

/// A server context: one logger, one worker pool, one configuration
///
/// Listeners are created through [`Server::listen`] and served by
/// [`Server::run`]. Several listeners may share one server, each with its
/// own acceptor thread.
pub struct Server {
    config: ServerConfig,
    logger: Arc<Logger>,
    pool: Pool,
}

impl Server {
    /// Server configured from `SS_*` environment variables
    pub fn new<H: Handler>(handler: H) -> SsResult<Self> {
        Self::with_config(ServerConfig::from_env(), handler)
    }

    /// Server with an explicit configuration
    ///
    /// Logs go to standard error at `config.log_level` until replaced with
    /// [`Logger::set_sink`].
    pub fn with_config<H: Handler>(config: ServerConfig, handler: H) -> SsResult<Self> {
        config.validate()?;

        let logger = Arc::new(Logger::with_sink(
            config.log_level,
            StderrSink::new(config.flush_log),
        ));
        let pool = Pool::new(&config, Arc::new(handler), Arc::clone(&logger));

        ss_debug!(
            logger,
            "server created: cache_limit={} backlog={}",
            config.cache_limit,
            config.backlog
        );

        Ok(Self { config, logger, pool })
    }

    /// Bind a listener with the configured backlog
    pub fn listen(&self, addr: &ListenAddr) -> SsResult<Listener> {
        match Listener::bind(addr, self.config.backlog) {
            Ok(listener) => {
                match listener.local_addr() {
                    Ok(bound) => ss_info!(self.logger, "listening on {}", bound),
                    Err(_) => ss_info!(self.logger, "listening on {}", addr),
                }
                Ok(listener)
            }
            Err(e) => {
                ss_error!(self.logger, "cannot listen on {}: {}", addr, e);
                Err(e)
            }
        }
    }

    /// Serve `listener` on the calling thread
    ///
    /// Does not return under normal operation. The returned error is the
    /// readiness-wait failure that stopped the loop.
    pub fn run(&self, listener: &Listener) -> SsError {
        Acceptor::new(listener, &self.pool).run()
    }

    /// Change how many idle workers are retained
    pub fn set_cache_limit(&self, n: usize) {
        self.pool.set_cache_limit(n);
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::os::unix::net::UnixStream;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn hello(log: &Logger, conn: &mut Connection) {
        ss_info!(log, "Hello World");
        let _ = conn.write_all(b"Hello World\n");
    }

    fn quiet_config() -> ServerConfig {
        ServerConfig::new().log_level(LogLevel::Fatal)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Server::with_config(ServerConfig::new().backlog(0), hello).unwrap_err();
        assert_eq!(err, SsError::InvalidConfig("backlog must be positive"));
    }

    #[test]
    fn test_set_cache_limit() {
        let server = Server::with_config(quiet_config().cache_limit(3), hello).unwrap();
        assert_eq!(server.pool().cache_limit(), 3);
        server.set_cache_limit(0);
        assert_eq!(server.pool().stats().cache_limit, 0);
    }

    #[test]
    fn test_listen_failure_reported() {
        let server = Server::with_config(quiet_config(), hello).unwrap();
        let first = server.listen(&"127.0.0.1:0".parse().unwrap()).unwrap();
        let taken = first.local_addr().unwrap();

        let err = server.listen(&taken).unwrap_err();
        assert!(matches!(err, SsError::Listen(ListenError::Bind(_))), "{err:?}");
    }

    #[test]
    fn test_serves_tcp_clients() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);

        let server = Server::with_config(ServerConfig::new(), hello).unwrap();
        server.logger().set_sink(sink_fn(move |level, args| {
            sink_lines.lock().unwrap().push((level, args.to_string()));
        }));

        let listener = server.listen(&"127.0.0.1:0".parse().unwrap()).unwrap();
        let ListenAddr::Tcp(addr) = listener.local_addr().unwrap() else {
            panic!("expected tcp address");
        };

        thread::spawn(move || {
            let _ = server.run(&listener);
        });

        for _ in 0..4 {
            let mut client = TcpStream::connect(addr).unwrap();
            let mut reply = String::new();
            client.read_to_string(&mut reply).unwrap();
            assert_eq!(reply, "Hello World\n");
        }

        let lines = lines.lock().unwrap();
        let listening = (LogLevel::Info, format!("listening on tcp://{addr}"));
        assert_eq!(lines.first(), Some(&listening), "{lines:?}");
        let hellos = lines
            .iter()
            .filter(|(level, msg)| *level == LogLevel::Info && msg == "Hello World")
            .count();
        assert_eq!(hellos, 4, "{lines:?}");
    }

    #[test]
    fn test_serves_local_clients() {
        let path = std::env::temp_dir().join(format!("ss-server-{}.sock", std::process::id()));
        let server = Server::with_config(quiet_config(), hello).unwrap();
        let listener = server.listen(&ListenAddr::Local(path.clone())).unwrap();

        thread::spawn(move || {
            let _ = server.run(&listener);
        });

        let mut client = UnixStream::connect(&path).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert_eq!(reply, "Hello World\n");
    }
}
