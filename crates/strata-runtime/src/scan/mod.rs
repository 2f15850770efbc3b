//! Sources that read files.
//!
//! File formats live behind [`FileOpener`]: it turns a path into a [`ConcurrentPuller`] that
//! several scan workers can pull at once. [`ObjectOpener`] reads columnar objects through an
//! [`ObjectCache`](strata_cache::ObjectCache).

mod file;
mod object;
mod robot;

pub use file::{FileScan, ScanWorker};
pub use object::{ObjectOpener, ObjectPuller, Scanner};
pub use robot::Robot;

use crate::context::QueryContext;
use crate::error::RuntimeResult;
use crate::Puller;
use std::fmt::Debug;
use std::sync::Arc;
use strata_vector::Vector;

/// A puller shared by several workers, each identified by its index.
pub trait ConcurrentPuller: Send + Sync + Debug {
    fn concurrent_pull(&self, done: bool, worker: usize) -> RuntimeResult<Option<Vector>>;
}

/// Opens the file at `path` for `workers` concurrent workers.
pub trait FileOpener: Send + Sync + Debug {
    fn open(
        &self,
        ctx: &QueryContext,
        path: &str,
        workers: usize,
    ) -> RuntimeResult<Arc<dyn ConcurrentPuller>>;
}

/// A concurrent puller driven as worker 0 alone.
#[derive(Debug)]
pub(crate) struct Solo(pub(crate) Arc<dyn ConcurrentPuller>);

impl Puller for Solo {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        self.0.concurrent_pull(done, 0)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::test_support::col;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves in-memory "files": each path maps to its batches, handed out to any worker.
    #[derive(Debug, Default)]
    pub(crate) struct MemFiles {
        files: HashMap<String, Vec<String>>,
        pub(crate) opened: Mutex<Vec<String>>,
    }

    impl MemFiles {
        pub(crate) fn with(mut self, path: &str, batches: &[&str]) -> Self {
            self.files
                .insert(path.to_string(), batches.iter().map(|b| b.to_string()).collect());
            self
        }
    }

    #[derive(Debug)]
    struct MemFile(Mutex<Vec<Vector>>);

    impl ConcurrentPuller for MemFile {
        fn concurrent_pull(&self, done: bool, _worker: usize) -> RuntimeResult<Option<Vector>> {
            let mut batches = self.0.lock().unwrap();
            if done {
                batches.clear();
                return Ok(None);
            }
            Ok(batches.pop())
        }
    }

    impl FileOpener for MemFiles {
        fn open(
            &self,
            ctx: &QueryContext,
            path: &str,
            _workers: usize,
        ) -> RuntimeResult<Arc<dyn ConcurrentPuller>> {
            let batches = self.files.get(path).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")
            })?;
            self.opened.lock().unwrap().push(path.to_string());
            let mut vecs: Vec<Vector> = batches.iter().map(|b| col(ctx, b)).collect();
            vecs.reverse();
            Ok(Arc::new(MemFile(Mutex::new(vecs))))
        }
    }
}
