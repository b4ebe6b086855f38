//! Error conversion helpers for builder code
//!
//! Provides an extension trait for lifting foreign errors into `ComposeError`.

use crate::application::{ComposeError, ComposeResult};

/// Extension trait for converting foreign results inside a producer.
pub trait BuilderResultExt<T> {
    /// Add context to a builder failure.
    ///
    /// # Example
    /// ```ignore
    /// let count: usize = raw.parse().with_builder_context("parse item count")?;
    /// ```
    fn with_builder_context(self, context: &str) -> ComposeResult<T>;
}

impl<T, E> BuilderResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_builder_context(self, context: &str) -> ComposeResult<T> {
        self.map_err(|e| ComposeError::builder(context, e))
    }
}
