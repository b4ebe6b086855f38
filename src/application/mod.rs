//! Application layer: registry, scope guards, producers and the composer driver
//!
//! This layer shares stacks between guards, drivers and the registry and
//! orchestrates the domain operations for each invocation.

pub mod composer;
pub mod error;
pub mod error_ext;
pub mod registry;
pub mod render;
pub mod scope;

pub use composer::{Composer, Composition, Driver};
pub use error::{ComposeError, ComposeResult};
pub use error_ext::BuilderResultExt;
pub use registry::{Registry, StackHandle};
pub use render::{
    from_fn, once, script, Composable, Event, FromFn, Once, Produced, Render, Script,
};
pub use scope::{Invocation, ScopeGuard};
