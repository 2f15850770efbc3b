use std::sync::Arc;
use strata_cache::CacheError;
use strata_expr::ExprError;
use strata_vector::TypeError;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Failures that end a stream. Per-row failures travel as error values instead.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("context canceled")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: Box<RuntimeError>,
    },

    #[error("{0}")]
    InvalidOperator(String),

    #[error("{0}: worker thread exited")]
    Disconnected(&'static str),

    /// An error from an upstream operator that several consumers observe.
    #[error(transparent)]
    Upstream(Arc<RuntimeError>),
}

impl RuntimeError {
    pub fn open(path: impl Into<String>, source: impl Into<RuntimeError>) -> Self {
        RuntimeError::Open {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }

    pub fn is_canceled(&self) -> bool {
        match self {
            RuntimeError::Canceled => true,
            RuntimeError::Upstream(err) => err.is_canceled(),
            _ => false,
        }
    }
}
