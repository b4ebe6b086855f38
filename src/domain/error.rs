//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::stack::{InvocationId, ScopeId};

/// Violations of the scope/attachment invariants of one invocation.
///
/// All of these are programmer errors in builder code; none is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{token}: value produced outside any open scope")]
    UnscopedProduction { token: InvocationId },

    #[error("{token}: stack corrupted: closing {expected} but top is {}", describe_top(.found))]
    StackCorruption {
        token: InvocationId,
        expected: ScopeId,
        found: Option<ScopeId>,
    },

    #[error("{0}: invocation is not live")]
    UnresolvedInvocation(InvocationId),

    #[error("{token}: scope nesting exceeds limit of {limit}")]
    DepthExceeded { token: InvocationId, limit: usize },

    #[error("{token}: {scope} is not an open scope")]
    UnknownScope { token: InvocationId, scope: ScopeId },
}

fn describe_top(found: &Option<ScopeId>) -> String {
    match found {
        Some(scope) => scope.to_string(),
        None => "empty".to_string(),
    }
}

/// Result type for stack operations.
pub type DomainResult<T> = Result<T, DomainError>;
