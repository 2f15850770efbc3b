use super::{ConcurrentPuller, FileOpener};
use crate::context::QueryContext;
use crate::error::RuntimeResult;
use crate::op::limit::slice;
use crate::Puller;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use strata_cache::{Object, ObjectCache, Projection};
use strata_vector::{TypeContext, Vector};

#[derive(Debug, Default)]
struct Cursor {
    vec: Option<Vector>,
    off: u32,
}

/// Batches of one projected object, handed to whichever worker asks next.
///
/// The projection is fetched on the first pull.
#[derive(Debug)]
pub struct ObjectPuller {
    object: Arc<Object>,
    types: Arc<TypeContext>,
    projection: Projection,
    batch_size: u32,
    cursor: Mutex<Cursor>,
}

impl ObjectPuller {
    pub fn new(ctx: &QueryContext, object: Arc<Object>, projection: Projection) -> Self {
        Self {
            object,
            types: Arc::clone(&ctx.types),
            projection,
            batch_size: u32::try_from(ctx.batch_size()).unwrap_or(u32::MAX),
            cursor: Mutex::new(Cursor::default()),
        }
    }
}

impl ConcurrentPuller for ObjectPuller {
    fn concurrent_pull(&self, done: bool, _worker: usize) -> RuntimeResult<Option<Vector>> {
        // Other workers may still be reading, so `done` from one of them keeps the data.
        if done {
            return Ok(None);
        }
        let mut cursor = self.cursor.lock().expect("object puller poisoned");
        if cursor.vec.is_none() {
            cursor.vec = Some(self.object.fetch(&self.types, &self.projection)?);
        }
        let off = cursor.off;
        let Some(vec) = cursor.vec.as_ref().filter(|v| off < v.len()) else {
            return Ok(None);
        };
        let to = off.saturating_add(self.batch_size).min(vec.len());
        let out = slice(vec.clone(), off, to);
        cursor.off = to;
        Ok(Some(out))
    }
}

/// Opens columnar objects through a shared cache and projects them.
#[derive(Debug)]
pub struct ObjectOpener {
    cache: Arc<ObjectCache>,
    projection: Projection,
}

impl ObjectOpener {
    pub fn new(cache: Arc<ObjectCache>, projection: Projection) -> Self {
        Self { cache, projection }
    }
}

impl FileOpener for ObjectOpener {
    fn open(
        &self,
        ctx: &QueryContext,
        path: &str,
        _workers: usize,
    ) -> RuntimeResult<Arc<dyn ConcurrentPuller>> {
        let object = self.cache.get_or_open(path)?;
        Ok(Arc::new(ObjectPuller::new(ctx, object, self.projection.clone())))
    }
}

/// Emits one cached object, projected, in batches. Each stream reads it again.
#[derive(Debug)]
pub struct Scanner {
    ctx: QueryContext,
    cache: Arc<ObjectCache>,
    path: PathBuf,
    projection: Projection,
    puller: Option<ObjectPuller>,
}

impl Scanner {
    pub fn new(
        ctx: &QueryContext,
        cache: Arc<ObjectCache>,
        path: impl Into<PathBuf>,
        projection: Projection,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            cache,
            path: path.into(),
            projection,
            puller: None,
        }
    }
}

impl Puller for Scanner {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.puller = None;
            return Ok(None);
        }
        self.ctx.check()?;
        let puller = match self.puller.take() {
            Some(puller) => puller,
            None => {
                let object = self.cache.get_or_open(&self.path)?;
                ObjectPuller::new(&self.ctx, object, self.projection.clone())
            }
        };
        let out = puller.concurrent_pull(false, 0)?;
        if out.is_some() {
            self.puller = Some(puller);
        }
        Ok(out)
    }
}
