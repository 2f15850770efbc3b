use crate::error::CacheResult;
use crate::object::Object;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    /// Open objects kept before the least recently used one is closed.
    pub max_objects: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { max_objects: 64 }
    }
}

/// Opened objects shared across queries, keyed by path.
#[derive(Debug)]
pub struct ObjectCache {
    objects: Mutex<LruCache<PathBuf, Arc<Object>>>,
}

impl ObjectCache {
    pub fn new(options: CacheOptions) -> Self {
        let cap = NonZeroUsize::new(options.max_objects).unwrap_or(NonZeroUsize::MIN);
        Self {
            objects: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Returns the cached object for `path`, opening it on a miss.
    pub fn get_or_open(&self, path: impl AsRef<Path>) -> CacheResult<Arc<Object>> {
        let path = path.as_ref();
        if let Some(hit) = self
            .objects
            .lock()
            .expect("object cache poisoned")
            .get(path)
        {
            return Ok(Arc::clone(hit));
        }
        // Opened outside the lock; a concurrent open of the same path keeps the first insert.
        let opened = Arc::new(Object::from_path(path)?);
        let mut objects = self.objects.lock().expect("object cache poisoned");
        if let Some(hit) = objects.get(path) {
            return Ok(Arc::clone(hit));
        }
        if let Some((evicted, old)) = objects.push(path.to_path_buf(), Arc::clone(&opened)) {
            if evicted != path {
                log::debug!("evicting columnar object {}", evicted.display());
                old.close();
            }
        }
        Ok(opened)
    }

    /// Closes and forgets the object at `path`, if cached.
    pub fn evict(&self, path: impl AsRef<Path>) -> bool {
        let removed = self
            .objects
            .lock()
            .expect("object cache poisoned")
            .pop(path.as_ref());
        match removed {
            Some(object) => {
                object.close();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("object cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ObjectWriter;
    use pretty_assertions::assert_eq;
    use strata_vector::Vector;

    #[test]
    fn least_recently_used_object_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..3).map(|i| dir.path().join(format!("{i}.obj"))).collect();
        for (i, path) in paths.iter().enumerate() {
            ObjectWriter::write_to_path(&Vector::int64s(vec![i as i64]), path).unwrap();
        }
        let cache = ObjectCache::new(CacheOptions { max_objects: 2 });
        let first = cache.get_or_open(&paths[0]).unwrap();
        let again = cache.get_or_open(&paths[0]).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        cache.get_or_open(&paths[1]).unwrap();
        cache.get_or_open(&paths[2]).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(first.is_closed());
        assert!(cache.evict(&paths[2]));
        assert!(!cache.evict(&paths[2]));
        assert_eq!(cache.len(), 1);
    }
}
