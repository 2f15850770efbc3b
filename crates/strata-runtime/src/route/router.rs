use crate::context::{CancelToken, QueryContext};
use crate::error::{RuntimeError, RuntimeResult};
use crate::Puller;
use crossbeam_channel::{select, Receiver, Sender};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use strata_vector::Vector;

/// What a route receives: a batch, end of stream, or an upstream error seen by every route.
pub type Msg = Result<Option<Vector>, Arc<RuntimeError>>;

/// Distributes each upstream batch over the routes of a router.
pub trait Forward: Send + Debug {
    /// Number of routes this forwarder feeds.
    fn routes(&self) -> usize;

    /// Sends the rows of `vec` to their routes. Returns false to stop the router.
    fn forward(&mut self, vec: &Vector, out: &mut Outlets) -> bool;
}

#[derive(Debug)]
struct Outlet {
    tx: Sender<Msg>,
    done: Receiver<()>,
    blocked: bool,
    // The route was dropped.
    gone: bool,
}

enum Sent {
    Delivered,
    Done,
    Gone,
    Canceled,
}

/// The sending ends of a router's routes.
#[derive(Debug)]
pub struct Outlets {
    outlets: Vec<Outlet>,
    nblocked: usize,
    cancel: CancelToken,
}

impl Outlets {
    pub fn len(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }

    /// Sends `vec` to route `i`. Returns false when the query was canceled.
    pub fn send(&mut self, i: usize, vec: Vector) -> bool {
        self.deliver(i, Ok(Some(vec)))
    }

    fn deliver(&mut self, i: usize, msg: Msg) -> bool {
        let outlet = &self.outlets[i];
        if outlet.blocked {
            return true;
        }
        let sent = select! {
            send(outlet.tx, msg) -> res => if res.is_ok() { Sent::Delivered } else { Sent::Gone },
            recv(outlet.done) -> res => if res.is_ok() { Sent::Done } else { Sent::Gone },
            recv(self.cancel.receiver()) -> _ => Sent::Canceled,
        };
        match sent {
            Sent::Delivered => {}
            Sent::Done => self.block(i, false),
            Sent::Gone => self.block(i, true),
            Sent::Canceled => return false,
        }
        true
    }

    fn broadcast(&mut self, msg: &Msg) -> bool {
        (0..self.outlets.len()).all(|i| self.deliver(i, msg.clone()))
    }

    fn block(&mut self, i: usize, gone: bool) {
        let outlet = &mut self.outlets[i];
        outlet.gone |= gone;
        if !outlet.blocked {
            outlet.blocked = true;
            self.nblocked += 1;
        }
    }

    fn unblock(&mut self) {
        self.nblocked = 0;
        for outlet in &mut self.outlets {
            outlet.blocked = outlet.gone;
            self.nblocked += usize::from(outlet.gone);
        }
    }

    fn all_blocked(&self) -> bool {
        self.nblocked == self.outlets.len()
    }

    fn all_gone(&self) -> bool {
        self.outlets.iter().all(|o| o.gone)
    }
}

/// The router thread: pulls the shared parent and hands batches to the forwarder.
#[derive(Debug)]
struct Task {
    parent: Box<dyn Puller>,
    forward: Box<dyn Forward>,
    outlets: Outlets,
}

impl Task {
    fn run(mut self) {
        loop {
            if self.outlets.all_gone() {
                log::debug!("router: every route dropped");
                let _ = self.parent.pull(true);
                return;
            }
            if self.outlets.all_blocked() {
                if let Err(err) = self.parent.pull(true) {
                    self.outlets.broadcast(&Err(Arc::new(err)));
                    return;
                }
                self.outlets.unblock();
            }
            match self.parent.pull(false) {
                Ok(Some(vec)) => {
                    if !self.forward.forward(&vec, &mut self.outlets) {
                        return;
                    }
                }
                Ok(None) => {
                    if !self.outlets.broadcast(&Ok(None)) {
                        return;
                    }
                    self.outlets.unblock();
                }
                Err(err) => {
                    log::debug!("router: upstream failed: {err}");
                    self.outlets.broadcast(&Err(Arc::new(err)));
                    return;
                }
            }
        }
    }
}

#[derive(Debug)]
struct Launch {
    task: Mutex<Option<Task>>,
}

impl Launch {
    /// Starts the router thread on the first pull of any route.
    fn start(&self) -> RuntimeResult<()> {
        let Some(task) = self.task.lock().expect("router launch poisoned").take() else {
            return Ok(());
        };
        log::debug!("router: starting with {} routes", task.outlets.len());
        std::thread::Builder::new()
            .name("strata-router".to_string())
            .spawn(move || task.run())?;
        Ok(())
    }
}

/// One branch of a router.
///
/// Routes share an upstream puller through a router thread and rendezvous channels, so a
/// route only makes progress while the others are pulled too: drive them from separate
/// threads. `pull(true)` marks the route done for the current stream; once every route is
/// done the router passes `done` upstream.
#[derive(Debug)]
pub struct Route {
    rx: Receiver<Msg>,
    done: Sender<()>,
    cancel: CancelToken,
    launch: Arc<Launch>,
}

impl Puller for Route {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        self.launch.start()?;
        if done {
            return select! {
                // A router that already exited has nothing left to stop.
                send(self.done, ()) -> _ => Ok(None),
                recv(self.cancel.receiver()) -> _ => Err(RuntimeError::Canceled),
            };
        }
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(Ok(vec)) => Ok(vec),
                Ok(Err(err)) => Err(RuntimeError::Upstream(err)),
                Err(_) => Err(RuntimeError::Disconnected("router")),
            },
            recv(self.cancel.receiver()) -> _ => Err(RuntimeError::Canceled),
        }
    }
}

/// Splits `parent` into one route per output of `forward`.
pub fn branch(
    ctx: &QueryContext,
    parent: Box<dyn Puller>,
    forward: impl Forward + 'static,
) -> Vec<Route> {
    let n = forward.routes();
    let mut outlets = Vec::with_capacity(n);
    let mut ends = Vec::with_capacity(n);
    for _ in 0..n {
        let (tx, rx) = crossbeam_channel::bounded(0);
        let (done_tx, done_rx) = crossbeam_channel::bounded(0);
        outlets.push(Outlet {
            tx,
            done: done_rx,
            blocked: false,
            gone: false,
        });
        ends.push((rx, done_tx));
    }
    let launch = Arc::new(Launch {
        task: Mutex::new(Some(Task {
            parent,
            forward: Box::new(forward),
            outlets: Outlets {
                outlets,
                nblocked: 0,
                cancel: ctx.cancel.clone(),
            },
        })),
    });
    ends.into_iter()
        .map(|(rx, done)| Route {
            rx,
            done,
            cancel: ctx.cancel.clone(),
            launch: Arc::clone(&launch),
        })
        .collect()
}
