//! Registry of live invocations and their stacks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::config::Settings;
use crate::domain::{Attach, DomainError, DomainResult, InvocationId, InvocationStack};

/// Shared handle to one invocation's stack.
pub type StackHandle<N> = Arc<Mutex<InvocationStack<N>>>;

/// Lock a stack handle.
///
/// Locks are never held across builder code, so a poisoned mutex still holds
/// a consistent stack and is recovered.
pub fn lock<N: Attach>(handle: &StackHandle<N>) -> MutexGuard<'_, InvocationStack<N>> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry contents: stacks of live invocations, plus tokens handed out by
/// [`Registry::allocate`] whose stack has not been created yet.
struct Entries<N: Attach> {
    live: HashMap<InvocationId, StackHandle<N>>,
    pending: HashSet<InvocationId>,
}

/// Maps invocation tokens to their stacks.
///
/// Tokens come from a counter owned by the registry and are never reused, so
/// two invocations of the same registry can never share a stack. A stack is
/// created at most once per token; a retired token stays dead.
pub struct Registry<N: Attach> {
    next: AtomicU64,
    entries: Mutex<Entries<N>>,
    max_depth: Option<usize>,
}

impl<N: Attach> fmt::Debug for Registry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("live", &self.live())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl<N: Attach> Default for Registry<N> {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl<N: Attach> Registry<N> {
    pub fn new(settings: &Settings) -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(Entries {
                live: HashMap::with_capacity(settings.registry_capacity),
                pending: HashSet::new(),
            }),
            max_depth: settings.depth_limit(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries<N>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_token(&self) -> InvocationId {
        InvocationId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn new_stack(&self, token: InvocationId) -> StackHandle<N> {
        trace!(%token, "stack created");
        Arc::new(Mutex::new(InvocationStack::new(token, self.max_depth)))
    }

    /// Hand out a token no other invocation of this registry has used.
    ///
    /// Its stack is created by the first [`Registry::resolve`].
    pub fn allocate(&self) -> InvocationId {
        let token = self.next_token();
        self.entries().pending.insert(token);
        token
    }

    /// Allocate a token and create its stack in one step.
    pub fn register(&self) -> (InvocationId, StackHandle<N>) {
        let token = self.next_token();
        let stack = self.new_stack(token);
        self.entries().live.insert(token, stack.clone());
        (token, stack)
    }

    /// Stack for `token`, created empty on first access.
    ///
    /// Fails for tokens this registry never handed out and for retired ones.
    pub fn resolve(&self, token: InvocationId) -> DomainResult<StackHandle<N>> {
        let mut entries = self.entries();
        if let Some(stack) = entries.live.get(&token) {
            return Ok(stack.clone());
        }
        if !entries.pending.remove(&token) {
            return Err(DomainError::UnresolvedInvocation(token));
        }
        let stack = self.new_stack(token);
        entries.live.insert(token, stack.clone());
        Ok(stack)
    }

    /// Stack for `token` without creating one.
    pub fn lookup(&self, token: InvocationId) -> Option<StackHandle<N>> {
        self.entries().live.get(&token).cloned()
    }

    /// Remove the entry for `token`, returning its stack if it was live.
    pub fn retire(&self, token: InvocationId) -> Option<StackHandle<N>> {
        let mut entries = self.entries();
        entries.pending.remove(&token);
        let removed = entries.live.remove(&token);
        debug!(%token, found = removed.is_some(), "stack retired");
        removed
    }

    pub fn contains(&self, token: InvocationId) -> bool {
        self.entries().live.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.entries().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().live.is_empty()
    }

    /// Tokens of all live invocations, sorted.
    pub fn live(&self) -> Vec<InvocationId> {
        let mut tokens: Vec<_> = self.entries().live.keys().copied().collect();
        tokens.sort();
        tokens
    }
}
