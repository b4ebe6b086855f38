//! Scoped tree composition.
//!
//! A builder describes a hierarchy as a lazy sequence of produced children
//! plus nested scopes. The [`Composer`] drives the sequence, keeps a private
//! stack of open scopes per invocation, and attaches every produced child to
//! the innermost open scope of *its own* invocation.
//!
//! ```ignore
//! use treecompose::{script, Composer, Element, Event};
//!
//! let composer = Composer::new();
//! let page = composer.run(script(vec![
//!     Event::Open(Element::new("div")),
//!     Event::child("a"),
//!     Event::Open(Element::new("p")),
//!     Event::child("b"),
//!     Event::Close,
//!     Event::child("c"),
//!     Event::Close,
//! ]))?;
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod util;

pub use application::{
    from_fn, once, script, BuilderResultExt, Composable, ComposeError, ComposeResult, Composer,
    Composition, Driver, Event, FromFn, Invocation, Once, Produced, Registry, Render, ScopeGuard,
    Script,
};
pub use config::Settings;
pub use domain::{Attach, Children, Content, DomainError, Element, InvocationId, Outline, ScopeId};
