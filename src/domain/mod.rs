//! Domain layer: node contract, child storage and per-invocation scope stacks
//!
//! This layer is independent of external concerns (no locking, no config loading).

pub mod arena;
pub mod children;
pub mod element;
pub mod error;
pub mod node;
pub mod stack;

pub use arena::{ArenaEntry, ScopeArena, Slot};
pub use children::Children;
pub use element::{Content, Element, Outline};
pub use error::{DomainError, DomainResult};
pub use node::Attach;
pub use stack::{InvocationId, InvocationStack, ScopeId};
