//! # Hello World server
//!
//! Each connection is served by a pooled worker thread that writes one line
//! and closes. Serves TCP by default, or a local socket with `--unix`.
//!
//! ## Usage
//!
//!     cargo run -p ss-hello --release -- [--port 1234] [--unix /tmp/hello.sock]
//!                                       [--cache 16] [--log-level debug]
//!
//! Environment (overridden by flags): `SS_PORT`, `SS_UNIX_PATH`, plus the
//! `SS_*` server settings (`SS_CACHE_LIMIT`, `SS_BACKLOG`, `SS_LOG_LEVEL`,
//! `SS_FLUSH_EPRINT`, `SS_WORKER_STACK_KB`).
//!
//! ## Try it
//!
//!     nc 127.0.0.1 1234

use ss::constants::DEFAULT_PORT;
use ss::{
    current_worker_id, env_get, env_get_opt, ss_debug, ss_info, Connection, ListenAddr, LogLevel,
    Logger, Server, ServerConfig,
};

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

const PORT_ENV: &str = "SS_PORT";
const UNIX_PATH_ENV: &str = "SS_UNIX_PATH";

const HELLO: &[u8] = b"Hello World\n";

fn hello(log: &Logger, conn: &mut Connection) {
    ss_info!(log, "Hello World");
    if let Some(id) = current_worker_id() {
        ss_debug!(log, "served by {}", id);
    }
    let _ = conn.write_all(HELLO);
}

fn usage() -> ! {
    eprintln!("usage: hello [--port N] [--unix PATH] [--cache N] [--log-level LEVEL]");
    std::process::exit(2);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Phase 1: SS_* env vars
    let mut config = ServerConfig::from_env();
    let mut port: u16 = env_get(PORT_ENV, DEFAULT_PORT);
    let mut unix_path: Option<PathBuf> = env_get_opt(UNIX_PATH_ENV);

    // Phase 2: CLI flags override env vars
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(p) => port = p,
                    None => usage(),
                }
            }
            "--unix" | "-u" => {
                i += 1;
                match args.get(i) {
                    Some(p) => unix_path = Some(PathBuf::from(p)),
                    None => usage(),
                }
            }
            "--cache" | "-c" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(n) => config.cache_limit = n,
                    None => usage(),
                }
            }
            "--log-level" | "-l" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse::<LogLevel>().ok()) {
                    Some(level) => config.log_level = level,
                    None => usage(),
                }
            }
            "--help" | "-h" => usage(),
            s if s.parse::<u16>().is_ok() => {
                port = s.parse().unwrap_or(port);
            }
            _ => usage(),
        }
        i += 1;
    }

    // A client hanging up mid-write must not kill the process.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    let addr = match unix_path {
        Some(path) => ListenAddr::Local(path),
        None => ListenAddr::Tcp(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))),
    };

    let server = match Server::with_config(config, hello) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("hello: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!(
        "hello: addr={} cache={} backlog={} log={}",
        addr,
        server.config().cache_limit,
        server.config().backlog,
        server.config().log_level
    );

    let listener = match server.listen(&addr) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("hello: {}", e);
            std::process::exit(1);
        }
    };

    let err = server.run(&listener);
    drop(listener);
    eprintln!("hello: acceptor stopped: {}", err);
    std::process::exit(1);
}
