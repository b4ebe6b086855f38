//! Invocation context and scope guards.
//!
//! The driver hands an [`Invocation`] to its producer on every resume. Guards
//! opened through it carry the invocation's stack handle, so they never have
//! to work out which invocation they belong to.

use std::fmt;

use termtree::Tree;
use tracing::{error, trace};

use crate::application::registry::{lock, StackHandle};
use crate::application::ComposeResult;
use crate::domain::{Attach, DomainError, DomainResult, InvocationId, ScopeId};

/// Context of one running invocation.
pub struct Invocation<N: Attach> {
    token: InvocationId,
    stack: StackHandle<N>,
}

impl<N: Attach> Clone for Invocation<N> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            stack: self.stack.clone(),
        }
    }
}

impl<N: Attach> fmt::Debug for Invocation<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("token", &self.token)
            .field("depth", &self.depth())
            .finish()
    }
}

impl<N: Attach> Invocation<N> {
    pub(crate) fn new(token: InvocationId, stack: StackHandle<N>) -> Self {
        Self { token, stack }
    }

    pub fn token(&self) -> InvocationId {
        self.token
    }

    /// Number of scopes currently open in this invocation.
    pub fn depth(&self) -> usize {
        lock(&self.stack).depth()
    }

    pub(crate) fn stack(&self) -> &StackHandle<N> {
        &self.stack
    }

    /// Display trees of everything attached so far in this invocation.
    pub fn outline(&self) -> Vec<Tree<String>>
    where
        N: fmt::Display,
        N::Child: fmt::Display,
    {
        lock(&self.stack).outline()
    }

    /// Open `node` as a scope: it is attached under the current top and
    /// becomes the target for everything produced until the guard is released.
    pub fn open(&self, node: N) -> ComposeResult<ScopeGuard<N>> {
        let id = lock(&self.stack).open(node)?;
        trace!(token = %self.token, %id, "guard acquired");
        Ok(ScopeGuard {
            id,
            token: self.token,
            stack: Some(self.stack.clone()),
        })
    }

    /// Run `body` with `node` open, closing it on every exit path.
    ///
    /// An error from `body` takes precedence over an error from closing.
    pub fn scope<T>(
        &self,
        node: N,
        body: impl FnOnce(&Self) -> ComposeResult<T>,
    ) -> ComposeResult<T> {
        let guard = self.open(node)?;
        let result = body(self);
        let closed = guard.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Attach a child to the current top, exactly as if it had been produced.
    pub fn emit(&self, child: impl Into<N::Child>) -> ComposeResult<()> {
        lock(&self.stack).attach(child.into())?;
        Ok(())
    }

    /// Mutable access to the node of the innermost open scope.
    ///
    /// `f` runs while the stack is locked and must not use this invocation.
    pub fn with_current<T>(&self, f: impl FnOnce(&mut N) -> T) -> ComposeResult<T> {
        let mut stack = lock(&self.stack);
        let top = stack
            .top()
            .ok_or(DomainError::UnscopedProduction { token: self.token })?;
        Ok(stack.with_node(top, f)?)
    }
}

/// One open scope. Released exactly once: by [`ScopeGuard::close`] or on drop.
///
/// Guards must be released innermost first. Releasing an outer guard while an
/// inner one is still open corrupts the stack; the invocation then fails.
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct ScopeGuard<N: Attach> {
    id: ScopeId,
    token: InvocationId,
    stack: Option<StackHandle<N>>,
}

impl<N: Attach> fmt::Debug for ScopeGuard<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("open", &self.stack.is_some())
            .finish()
    }
}

impl<N: Attach> ScopeGuard<N> {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn token(&self) -> InvocationId {
        self.token
    }

    /// Mutable access to this guard's own node while it is open.
    ///
    /// Same locking rule as [`Invocation::with_current`].
    pub fn with_node<T>(&self, f: impl FnOnce(&mut N) -> T) -> ComposeResult<T> {
        match &self.stack {
            Some(stack) => Ok(lock(stack).with_node(self.id, f)?),
            None => Err(DomainError::UnknownScope {
                token: self.token,
                scope: self.id,
            }
            .into()),
        }
    }

    /// Close the scope, reporting stack corruption or a dead invocation.
    pub fn close(mut self) -> ComposeResult<()> {
        Ok(self.release()?)
    }

    fn release(&mut self) -> DomainResult<()> {
        match self.stack.take() {
            Some(stack) => {
                trace!(token = %self.token, id = %self.id, "guard released");
                let closed = lock(&stack).close(self.id);
                closed
            }
            None => Ok(()),
        }
    }
}

impl<N: Attach> Drop for ScopeGuard<N> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(token = %self.token, id = %self.id, %err, "scope released abnormally");
        }
    }
}
