use crate::error::{RuntimeError, RuntimeResult};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use strata_vector::TypeContext;

/// Tuning knobs for operators that batch their output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Rows per batch for operators that rebuild their output (sort, tail, merge blocks,
    /// scans of whole objects).
    pub batch_size: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { batch_size: 2048 }
    }
}

#[derive(Debug)]
struct CancelState {
    canceled: AtomicBool,
    // Dropped on cancel, which disconnects `rx` and wakes every `select!` waiting on it.
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

/// Shared cancellation signal for one query.
#[derive(Clone, Debug)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            state: Arc::new(CancelState {
                canceled: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    pub fn cancel(&self) {
        if !self.state.canceled.swap(true, Ordering::SeqCst) {
            log::debug!("query canceled");
        }
        self.state.tx.lock().expect("cancel token poisoned").take();
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    /// A receiver that becomes ready (disconnected) once the token is canceled.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.state.rx
    }

    pub fn check(&self) -> RuntimeResult<()> {
        if self.is_canceled() {
            return Err(RuntimeError::Canceled);
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-query state shared by every operator of one dataflow graph.
#[derive(Clone, Debug)]
pub struct QueryContext {
    pub types: Arc<TypeContext>,
    pub cancel: CancelToken,
    pub options: RuntimeOptions,
}

impl QueryContext {
    pub fn new(types: Arc<TypeContext>) -> Self {
        Self::with_options(types, RuntimeOptions::default())
    }

    pub fn with_options(types: Arc<TypeContext>, options: RuntimeOptions) -> Self {
        Self {
            types,
            cancel: CancelToken::new(),
            options,
        }
    }

    pub fn check(&self) -> RuntimeResult<()> {
        self.cancel.check()
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.options.batch_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;
    use std::time::Duration;

    #[test]
    fn cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = std::thread::spawn(move || {
            let (_tx, rx) = crossbeam_channel::bounded::<()>(0);
            select! {
                recv(rx) -> _ => false,
                recv(waiter.receiver()) -> _ => true,
            }
        });
        std::thread::sleep(Duration::from_millis(10));
        assert!(token.check().is_ok());
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(matches!(token.check(), Err(RuntimeError::Canceled)));
    }
}
