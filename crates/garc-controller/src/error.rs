use garc_auth::TokenExchangeError;
use garc_storage::{ErrorCategory, StorageError};

/// Errors that fail a reconcile pass.
///
/// Update conflicts never show up here; they are reported as
/// [`ApplyOutcome::Conflict`](crate::apply::ApplyOutcome::Conflict) and requeued.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StorageError),

    #[error("token exchange failed: {0}")]
    TokenExchange(#[from] TokenExchangeError),

    #[error("invalid expiry {value:?}: {source}")]
    ExpiryParse {
        value: String,
        #[source]
        source: time::error::Parse,
    },

    #[error("runner {name} has no uid yet")]
    MissingUid { name: String },
}

impl ReconcileError {
    /// Short machine-readable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::TokenExchange(_) => "token_exchange",
            Self::ExpiryParse { .. } => "expiry_parse",
            Self::MissingUid { .. } => "missing_uid",
        }
    }

    /// Category of the underlying store failure, if the pass failed in the store.
    pub fn store_category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Store(e) => Some(e.category()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
