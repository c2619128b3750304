use thiserror::Error;

/// Errors the engine can surface while evaluating a `ListUsers` request.
///
/// `ValidationSkip` and `Cycle` from the design notes are deliberately absent
/// here: both are silent, non-fatal control-flow outcomes (a dropped tuple,
/// an empty return from a revisited node) rather than errors.
#[derive(Error, Debug)]
pub enum ListUsersError {
    #[error("failed to resolve authorization model {model_id} for store {store_id}: {reason}")]
    ModelResolution {
        store_id: String,
        model_id: String,
        reason: String,
    },

    #[error("tuple read failed: {0}")]
    TupleReadFailure(String),

    #[error("failed to compute entrypoint reachability: {0}")]
    GraphError(String),

    #[error("difference sub-expansion failed on both sides: base={base}, subtract={subtract}")]
    AggregateChildErrors { base: String, subtract: String },

    #[error("unknown rewrite variant for relation '{relation}' on type '{object_type}'")]
    UnknownRewrite {
        object_type: String,
        relation: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ListUsersError>;
