use super::{ConcurrentPuller, FileOpener};
use crate::context::QueryContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::Puller;
use crossbeam_channel::{select, Receiver, Sender};
use std::sync::{Arc, Mutex};
use strata_vector::Vector;

/// An opened file and the serial number it was installed under.
type Current = (u64, Arc<dyn ConcurrentPuller>);

#[derive(Debug, Default)]
struct ScanState {
    current: Option<Current>,
    serial: u64,
    next: usize,
    ndone: usize,
    wake: Vec<Sender<()>>,
}

#[derive(Debug)]
struct Shared {
    ctx: QueryContext,
    opener: Arc<dyn FileOpener>,
    paths: Vec<String>,
    ignore_open_errors: bool,
    state: Mutex<ScanState>,
}

impl Shared {
    /// The file to pull after the one installed as `seen` ended: whatever another worker
    /// installed since, or else the next path that opens.
    fn next_file(&self, seen: Option<u64>) -> RuntimeResult<Option<Current>> {
        let mut state = self.state.lock().expect("file scan poisoned");
        if state.current.as_ref().map(|c| c.0) != seen {
            return Ok(state.current.clone());
        }
        let workers = state.wake.len();
        while let Some(path) = self.paths.get(state.next) {
            state.next += 1;
            match self.opener.open(&self.ctx, path, workers) {
                Ok(puller) => {
                    log::debug!("file scan: opened {path}");
                    state.serial += 1;
                    state.current = Some((state.serial, puller));
                    return Ok(state.current.clone());
                }
                Err(err) if self.ignore_open_errors => log::warn!("{path}: {err}"),
                Err(err) => return Err(RuntimeError::open(path.as_str(), err)),
            }
        }
        Ok(None)
    }

    /// Records that one worker finished its stream. The last one resets the scan and wakes
    /// everybody for the next stream.
    fn done(&self) {
        let mut state = self.state.lock().expect("file scan poisoned");
        state.ndone += 1;
        if state.ndone < state.wake.len() {
            return;
        }
        state.current = None;
        state.next = 0;
        state.ndone = 0;
        for wake in &state.wake {
            let _ = wake.try_send(());
        }
    }
}

/// Scans a list of files with one or more workers.
///
/// Workers share the file being read: when it runs out for one worker, the first to notice
/// opens the next path and the others follow. A worker that reaches the end of the last file
/// waits for every other worker to finish before starting the next stream.
#[derive(Debug)]
pub struct FileScan {
    shared: Arc<Shared>,
    solo: Option<ScanWorker>,
}

impl FileScan {
    pub fn new(
        ctx: &QueryContext,
        opener: Arc<dyn FileOpener>,
        paths: Vec<String>,
        ignore_open_errors: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                ctx: ctx.clone(),
                opener,
                paths,
                ignore_open_errors,
                state: Mutex::new(ScanState::default()),
            }),
            solo: None,
        }
    }

    fn workers(&self, n: usize) -> Vec<ScanWorker> {
        let mut state = self.shared.state.lock().expect("file scan poisoned");
        (0..n)
            .map(|id| {
                let (tx, rx) = crossbeam_channel::bounded(1);
                state.wake.push(tx);
                ScanWorker {
                    shared: Arc::clone(&self.shared),
                    id,
                    eos: false,
                    current: None,
                    wake: rx,
                }
            })
            .collect()
    }

    /// Splits the scan into `n` workers meant to be pulled from separate threads.
    pub fn concurrent_pullers(self, n: usize) -> RuntimeResult<Vec<ScanWorker>> {
        if n == 0 {
            return Err(RuntimeError::InvalidOperator(
                "file scan: at least one worker is required".to_string(),
            ));
        }
        if self.solo.is_some() {
            return Err(RuntimeError::InvalidOperator(
                "file scan: already pulled as a single worker".to_string(),
            ));
        }
        Ok(self.workers(n))
    }
}

impl Puller for FileScan {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if self.solo.is_none() {
            self.solo = self.workers(1).pop();
        }
        match self.solo.as_mut() {
            Some(worker) => worker.pull(done),
            None => Ok(None),
        }
    }
}

/// One worker of a [`FileScan`].
#[derive(Debug)]
pub struct ScanWorker {
    shared: Arc<Shared>,
    id: usize,
    eos: bool,
    current: Option<Current>,
    wake: Receiver<()>,
}

impl Puller for ScanWorker {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            // Already counted as finished for this stream.
            if self.eos {
                return Ok(None);
            }
            if let Some((_, file)) = self.current.take() {
                file.concurrent_pull(true, self.id)?;
            }
            self.shared.done();
            self.eos = true;
            return Ok(None);
        }
        if self.eos {
            self.eos = false;
            select! {
                recv(self.wake) -> _ => {}
                recv(self.shared.ctx.cancel.receiver()) -> _ => return Err(RuntimeError::Canceled),
            }
        }
        loop {
            self.shared.ctx.check()?;
            if let Some((_, file)) = &self.current {
                if let Some(vec) = file.concurrent_pull(false, self.id)? {
                    return Ok(Some(vec));
                }
            }
            let seen = self.current.as_ref().map(|c| c.0);
            match self.shared.next_file(seen)? {
                Some(next) => self.current = Some(next),
                None => {
                    self.current = None;
                    self.shared.done();
                    self.eos = true;
                    return Ok(None);
                }
            }
        }
    }
}
