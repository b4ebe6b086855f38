//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{DomainError, InvocationId};

/// Errors surfaced to the caller of a composition.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{token}: composition finished with {depth} scope(s) still open")]
    UnclosedScopes { token: InvocationId, depth: usize },

    #[error("{token}: close requested with no open scope")]
    UnbalancedClose { token: InvocationId },

    #[error("{token}: driver already finished")]
    Finished { token: InvocationId },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("builder failed: {context}")]
    Builder {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ComposeError {
    /// Wrap a failure raised by builder code.
    pub fn builder(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Builder {
            context: context.into(),
            source: source.into(),
        }
    }

    /// The domain violation behind this error, if any.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for composition operations.
pub type ComposeResult<T> = Result<T, ComposeError>;
