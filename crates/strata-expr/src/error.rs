use strata_vector::TypeError;

pub type ExprResult<T> = Result<T, ExprError>;

/// Failures while *building* an evaluator. Per-row failures are error values in the output
/// column instead.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{name}: expected {expected} arguments, got {got}")]
    ArgCount {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("unknown aggregation function: {0}")]
    UnknownAggregate(String),

    #[error("{0}: argument required")]
    ArgumentRequired(String),

    #[error("invalid regular expression: {0}")]
    Regex(String),

    #[error("{0}")]
    Cast(String),

    #[error("{0}: invalid partial")]
    InvalidPartial(String),

    #[error("rename: {0}")]
    Rename(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl From<regex::Error> for ExprError {
    fn from(err: regex::Error) -> Self {
        ExprError::Regex(err.to_string())
    }
}
