pub type TypeResult<T> = Result<T, TypeError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("duplicate field: {0}")]
    DuplicateField(String),

    #[error("invalid type name: {0:?}")]
    BadName(String),

    #[error("malformed type encoding")]
    MalformedEncoding,

    #[error("unknown type id: {0}")]
    UnknownId(u32),

    #[error("column length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: u32, got: u32 },

    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
}
