//! Per-invocation stack of open scopes.

use std::fmt;

use generational_arena::Index;
use termtree::Tree;
use tracing::{instrument, trace};

use crate::domain::arena::{ScopeArena, Slot};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::Attach;

/// Token identifying one builder invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(u64);

impl InvocationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invocation#{}", self.0)
    }
}

/// Handle of one opened scope inside its invocation's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Index);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "scope#{}.{}", slot, generation)
    }
}

/// Open scopes of exactly one invocation, top = current attachment target.
///
/// The stack owns the invocation's [`ScopeArena`]; opening a scope records it
/// under the current top immediately, produced children are recorded under
/// the top at production time.
pub struct InvocationStack<N: Attach> {
    token: InvocationId,
    tree: ScopeArena<N>,
    open: Vec<Index>,
    max_depth: Option<usize>,
    retired: bool,
    /// First corruption seen; once set, every operation reports it
    corruption: Option<DomainError>,
}

impl<N: Attach> fmt::Debug for InvocationStack<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationStack")
            .field("token", &self.token)
            .field("depth", &self.open.len())
            .field("entries", &self.tree.len())
            .field("retired", &self.retired)
            .field("corruption", &self.corruption)
            .finish()
    }
}

impl<N: Attach> InvocationStack<N> {
    pub fn new(token: InvocationId, max_depth: Option<usize>) -> Self {
        Self {
            token,
            tree: ScopeArena::new(),
            open: Vec::new(),
            max_depth,
            retired: false,
            corruption: None,
        }
    }

    pub fn token(&self) -> InvocationId {
        self.token
    }

    /// Number of currently open scopes.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn top(&self) -> Option<ScopeId> {
        self.open.last().copied().map(ScopeId)
    }

    /// Fails if the stack was retired or corrupted earlier.
    pub fn check(&self) -> DomainResult<()> {
        if self.retired {
            return Err(DomainError::UnresolvedInvocation(self.token));
        }
        match &self.corruption {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Enter a scope: attach `node` under the current top and make it the top.
    #[instrument(level = "trace", skip(self, node), fields(token = %self.token))]
    pub fn open(&mut self, node: N) -> DomainResult<ScopeId> {
        self.check()?;
        if let Some(limit) = self.max_depth {
            if self.open.len() >= limit {
                return Err(DomainError::DepthExceeded {
                    token: self.token,
                    limit,
                });
            }
        }

        let parent = self.open.last().copied();
        let idx = self.tree.insert(Slot::Scope(node), parent);
        self.open.push(idx);
        trace!(depth = self.open.len(), "scope opened");
        Ok(ScopeId(idx))
    }

    /// Exit a scope. `scope` must be the current top.
    #[instrument(level = "trace", skip(self), fields(token = %self.token))]
    pub fn close(&mut self, scope: ScopeId) -> DomainResult<()> {
        self.check()?;
        match self.open.last().copied() {
            Some(top) if top == scope.0 => {
                self.open.pop();
                trace!(depth = self.open.len(), "scope closed");
                Ok(())
            }
            found => {
                let err = DomainError::StackCorruption {
                    token: self.token,
                    expected: scope,
                    found: found.map(ScopeId),
                };
                self.corruption = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Attach a produced child to the current top.
    #[instrument(level = "trace", skip(self, child), fields(token = %self.token))]
    pub fn attach(&mut self, child: N::Child) -> DomainResult<ScopeId> {
        self.check()?;
        let top = self
            .open
            .last()
            .copied()
            .ok_or(DomainError::UnscopedProduction { token: self.token })?;
        self.tree.insert(Slot::Leaf(child), Some(top));
        Ok(ScopeId(top))
    }

    /// Mutable access to the node of an open scope.
    pub fn with_node<T>(&mut self, scope: ScopeId, f: impl FnOnce(&mut N) -> T) -> DomainResult<T> {
        self.check()?;
        let unknown = DomainError::UnknownScope {
            token: self.token,
            scope,
        };
        if !self.open.contains(&scope.0) {
            return Err(unknown);
        }
        match self.tree.get_mut(scope.0).map(|entry| &mut entry.slot) {
            Some(Slot::Scope(node)) => Ok(f(node)),
            _ => Err(unknown),
        }
    }

    /// Mark the stack dead and hand out the composed tree.
    ///
    /// Scopes still open are abandoned; their guards fail with
    /// `UnresolvedInvocation` when released.
    #[instrument(level = "trace", skip(self), fields(token = %self.token))]
    pub fn retire(&mut self) -> ScopeArena<N> {
        self.retired = true;
        self.open.clear();
        std::mem::take(&mut self.tree)
    }
}

impl<N> InvocationStack<N>
where
    N: Attach + fmt::Display,
    N::Child: fmt::Display,
{
    /// Display trees of everything attached so far.
    pub fn outline(&self) -> Vec<Tree<String>> {
        self.tree.to_trees()
    }
}
