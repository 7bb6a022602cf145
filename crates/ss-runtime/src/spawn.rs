//! Thread creation seam for the pool
//!
//! The pool never calls `std::thread` directly; it asks a [`ThreadSpawner`].
//! `OsSpawner` is the real implementation. Tests substitute spawners that
//! fail on demand to exercise the resource-exhaustion path.

use std::io;
use std::thread::{self, JoinHandle};

/// Body of a worker thread
pub type ThreadMain = Box<dyn FnOnce() + Send + 'static>;

/// Starts OS threads for new workers
pub trait ThreadSpawner: Send + Sync {
    /// Start `main` on a new thread called `name`
    ///
    /// On error `main` has been dropped without running.
    fn spawn(&self, name: String, main: ThreadMain) -> io::Result<JoinHandle<()>>;
}

/// Named OS threads with an optional fixed stack size
#[derive(Debug, Clone, Default)]
pub struct OsSpawner {
    stack_size: Option<usize>,
}

impl OsSpawner {
    pub fn new(stack_size: Option<usize>) -> Self {
        Self { stack_size }
    }
}

impl ThreadSpawner for OsSpawner {
    fn spawn(&self, name: String, main: ThreadMain) -> io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(name);
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_os_spawner_names_thread() {
        let spawner = OsSpawner::new(Some(128 * 1024));
        let (tx, rx) = mpsc::channel();
        let handle = spawner
            .spawn(
                "ss-worker-test".to_string(),
                Box::new(move || {
                    let name = thread::current().name().map(str::to_string);
                    tx.send(name).unwrap();
                }),
            )
            .unwrap();
        handle.join().unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("ss-worker-test"));
    }
}
