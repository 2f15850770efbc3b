use crate::error::{CacheError, CacheResult};
use crate::meta::{Metadata, Segment, Trailer, FORMAT_VERSION};
use crate::project::Projection;
use crate::shadow::Shadow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use strata_vector::{TypeContext, Vector};

pub(crate) const MAGIC: &[u8; 8] = b"STRATA01";
const FOOTER_LEN: u64 = 16;

/// Positional reads over an object's bytes.
pub trait ReadAt: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;
    fn size(&self) -> std::io::Result<u64>;
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn size(&self) -> std::io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<R: ReadAt + ?Sized> ReadAt for Arc<R> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        (**self).read_at(offset, buf)
    }

    fn size(&self) -> std::io::Result<u64> {
        (**self).size()
    }
}

/// A file read through a shared seek position.
#[derive(Debug)]
pub struct FileReader {
    file: Mutex<File>,
    size: u64,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl ReadAt for FileReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().expect("object file poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn size(&self) -> std::io::Result<u64> {
        Ok(self.size)
    }
}

/// Segment access handed down the shadow tree.
pub(crate) struct Loader<'a> {
    reader: &'a dyn ReadAt,
    size: u64,
}

impl<'a> Loader<'a> {
    pub(crate) fn read(&self, seg: &Segment) -> CacheResult<Vec<u8>> {
        let in_bounds = seg
            .offset
            .checked_add(seg.length)
            .is_some_and(|end| end <= self.size);
        if !in_bounds {
            return Err(CacheError::SegmentOutOfBounds {
                offset: seg.offset,
                length: seg.length,
                size: self.size,
            });
        }
        let mut buf = vec![0; seg.length as usize];
        self.reader.read_at(seg.offset, &mut buf)?;
        Ok(buf)
    }
}

/// An open columnar object.
///
/// Types are decoded into a context owned by the object; [`Object::fetch`] translates them into
/// the caller's context. Loaded data stays in the shadow tree until [`Object::close`].
pub struct Object {
    reader: Box<dyn ReadAt>,
    size: u64,
    local: TypeContext,
    meta: Arc<Metadata>,
    root: Mutex<Option<Arc<Shadow>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("size", &self.size)
            .field("len", &self.meta.len())
            .finish()
    }
}

impl Object {
    pub fn open(reader: impl ReadAt + 'static) -> CacheResult<Self> {
        let size = reader.size()?;
        if size < FOOTER_LEN {
            return Err(CacheError::BadMagic);
        }
        let mut footer = [0u8; FOOTER_LEN as usize];
        reader.read_at(size - FOOTER_LEN, &mut footer)?;
        let (len, magic) = footer.split_at(8);
        if magic != MAGIC {
            return Err(CacheError::BadMagic);
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(len);
        let len = u64::from_le_bytes(len_bytes);
        let trailer_start = (size - FOOTER_LEN)
            .checked_sub(len)
            .ok_or(CacheError::SegmentOutOfBounds {
                offset: 0,
                length: len,
                size,
            })?;
        let json = Loader {
            reader: &reader,
            size,
        }
        .read(&Segment {
            offset: trailer_start,
            length: len,
        })?;
        let trailer: Trailer = serde_json::from_slice(&json)?;
        if trailer.version != FORMAT_VERSION {
            return Err(CacheError::Corrupt(format!(
                "unsupported format version {}",
                trailer.version
            )));
        }
        let local = TypeContext::new();
        let mut types = Vec::new();
        trailer.root.types(&mut types);
        for ty in &types {
            local.lookup_by_value(ty)?;
        }
        log::debug!(
            "opened columnar object: {} rows, {} types, {size} bytes",
            trailer.root.len(),
            local.len()
        );
        Ok(Self {
            reader: Box::new(reader),
            size,
            local,
            meta: trailer.root,
            root: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> CacheResult<Self> {
        Object::open(FileReader::open(path)?)
    }

    pub fn len(&self) -> u32 {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn root(&self) -> CacheResult<Arc<Shadow>> {
        let mut root = self.root.lock().expect("object root poisoned");
        if let Some(shadow) = root.as_ref() {
            return Ok(Arc::clone(shadow));
        }
        let shadow = Arc::new(Shadow::new(
            &self.local,
            Arc::clone(&self.meta),
            self.meta.len(),
            None,
        )?);
        *root = Some(Arc::clone(&shadow));
        Ok(shadow)
    }

    /// Materializes `projection` with every type interned in `sctx`.
    pub fn fetch(&self, sctx: &TypeContext, projection: &Projection) -> CacheResult<Vector> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        let loader = Loader {
            reader: self.reader.as_ref(),
            size: self.size,
        };
        let root = self.root()?;
        crate::project::project(&root, &loader, &self.local, sctx, projection)
    }

    /// Drops everything loaded so far; later fetches fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.root.lock().expect("object root poisoned") = None;
        log::debug!("closed columnar object ({} rows)", self.len());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
