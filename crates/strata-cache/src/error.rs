use strata_vector::TypeError;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("not a columnar object (bad magic)")]
    BadMagic,

    #[error("segment {offset}+{length} is outside an object of {size} bytes")]
    SegmentOutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("corrupt object: {0}")]
    Corrupt(String),

    #[error("object is closed")]
    Closed,

    #[error(transparent)]
    Type(#[from] TypeError),
}

pub(crate) fn corrupt(msg: impl Into<String>) -> CacheError {
    CacheError::Corrupt(msg.into())
}
