//! User connection handler

use crate::connection::Connection;
use ss_core::Logger;

/// Per-connection callback run on a worker thread
///
/// Called once per accepted connection and must return for its worker to
/// be reused. The connection is borrowed: the worker closes it right after
/// `handle` returns. Per-server state (the "user argument") is whatever the
/// implementor carries.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, logger: &Logger, conn: &mut Connection);
}

impl<F> Handler for F
where
    F: Fn(&Logger, &mut Connection) + Send + Sync + 'static,
{
    fn handle(&self, logger: &Logger, conn: &mut Connection) {
        self(logger, conn)
    }
}
