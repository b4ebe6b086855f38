//! Composer driver: runs producers and assembles their trees.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, instrument, trace, warn};

use crate::application::registry::{lock, Registry};
use crate::application::render::{Produced, Render};
use crate::application::scope::Invocation;
use crate::application::{ComposeError, ComposeResult};
use crate::config::Settings;
use crate::domain::{Attach, InvocationId, ScopeArena};

/// Finished composition: the top-level scope nodes and the terminal result.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition<N, R> {
    roots: Vec<N>,
    output: R,
    token: InvocationId,
}

impl<N, R> Composition<N, R> {
    pub fn token(&self) -> InvocationId {
        self.token
    }

    /// Top-level scopes in the order they were opened.
    pub fn roots(&self) -> &[N] {
        &self.roots
    }

    /// First top-level scope.
    pub fn root(&self) -> Option<&N> {
        self.roots.first()
    }

    pub fn output(&self) -> &R {
        &self.output
    }

    pub fn into_root(self) -> Option<N> {
        self.roots.into_iter().next()
    }

    pub fn into_parts(self) -> (Vec<N>, R) {
        (self.roots, self.output)
    }
}

/// Entry point for running compositions.
///
/// Each composer owns a registry; clones share it. Invocations never share
/// stacks, whether they run on different threads, interleave on one thread,
/// or nest inside each other's producers.
pub struct Composer<N: Attach> {
    registry: Arc<Registry<N>>,
    settings: Arc<Settings>,
}

impl<N: Attach> Clone for Composer<N> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<N: Attach> fmt::Debug for Composer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<N: Attach> Default for Composer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Attach> Composer<N> {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            registry: Arc::new(Registry::new(&settings)),
            settings: Arc::new(settings),
        }
    }

    /// Build a composer from layered settings (see [`Settings::load`]).
    pub fn load(local: Option<&Path>) -> ComposeResult<Self> {
        Ok(Self::with_settings(Settings::load(local)?))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry<N> {
        &self.registry
    }

    /// Register a fresh invocation, then instantiate its producer.
    ///
    /// The producer is built after the registry entry exists, so a panicking
    /// builder still has its entry retired when the driver unwinds.
    #[instrument(level = "debug", skip_all)]
    pub fn start_with<A, P, F>(&self, builder: F, args: A) -> Driver<N, P>
    where
        P: Render<N>,
        F: FnOnce(A) -> P,
    {
        let (token, stack) = self.registry.register();
        debug!(%token, "invocation started");

        let mut driver = Driver {
            invocation: Invocation::new(token, stack),
            registry: self.registry.clone(),
            render: None,
            live: true,
            strict: self.settings.strict_completion,
            attached: 0,
        };
        driver.render = Some(builder(args));
        driver
    }

    pub fn start<P: Render<N>>(&self, render: P) -> Driver<N, P> {
        self.start_with(|render| render, render)
    }

    /// Run `builder(args)` to completion.
    pub fn run_with<A, P, F>(&self, builder: F, args: A) -> ComposeResult<Composition<N, P::Output>>
    where
        P: Render<N>,
        F: FnOnce(A) -> P,
    {
        self.start_with(builder, args).run()
    }

    pub fn run<P: Render<N>>(&self, render: P) -> ComposeResult<Composition<N, P::Output>> {
        self.start(render).run()
    }

    /// Run independent producers in parallel; results keep input order.
    pub fn run_all<P>(&self, renders: Vec<P>) -> Vec<ComposeResult<Composition<N, P::Output>>>
    where
        N: Send,
        N::Child: Send,
        P: Render<N> + Send,
        P::Output: Send,
    {
        debug!(count = renders.len(), "run_all");
        renders
            .into_par_iter()
            .map(|render| self.run(render))
            .collect()
    }
}

/// Drives one invocation, one produced child per step.
///
/// The registry entry is retired exactly once: on completion, on the first
/// error, or when the driver is dropped unfinished.
pub struct Driver<N: Attach, P: Render<N>> {
    invocation: Invocation<N>,
    registry: Arc<Registry<N>>,
    render: Option<P>,
    live: bool,
    strict: bool,
    attached: usize,
}

impl<N: Attach, P: Render<N>> fmt::Debug for Driver<N, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("token", &self.invocation.token())
            .field("live", &self.live)
            .field("attached", &self.attached)
            .finish()
    }
}

impl<N: Attach, P: Render<N>> Driver<N, P> {
    pub fn token(&self) -> InvocationId {
        self.invocation.token()
    }

    pub fn invocation(&self) -> &Invocation<N> {
        &self.invocation
    }

    /// Number of produced children attached so far.
    pub fn attached(&self) -> usize {
        self.attached
    }

    pub fn is_finished(&self) -> bool {
        !self.live
    }

    /// Pull one value from the producer.
    ///
    /// Returns `Ok(None)` after attaching a child, `Ok(Some(_))` once the
    /// producer finishes. Any error ends the invocation.
    pub fn step(&mut self) -> ComposeResult<Option<Composition<N, P::Output>>> {
        let token = self.invocation.token();
        let render = match (self.live, self.render.as_mut()) {
            (true, Some(render)) => render,
            _ => return Err(ComposeError::Finished { token }),
        };

        let produced = match render.resume(&self.invocation) {
            Ok(produced) => produced,
            Err(err) => {
                self.abort(&err);
                return Err(err);
            }
        };

        match produced {
            Produced::Child(child) => {
                let attached = lock(self.invocation.stack()).attach(child);
                match attached {
                    Ok(scope) => {
                        self.attached += 1;
                        trace!(%token, %scope, "child attached");
                        Ok(None)
                    }
                    Err(err) => {
                        let err = ComposeError::from(err);
                        self.abort(&err);
                        Err(err)
                    }
                }
            }
            Produced::Finished(output) => self.complete(output).map(Some),
        }
    }

    /// Drive the producer to completion.
    #[instrument(level = "debug", skip_all, fields(token = %self.invocation.token()))]
    pub fn run(mut self) -> ComposeResult<Composition<N, P::Output>> {
        loop {
            if let Some(composition) = self.step()? {
                return Ok(composition);
            }
        }
    }

    fn complete(&mut self, output: P::Output) -> ComposeResult<Composition<N, P::Output>> {
        let token = self.invocation.token();
        let still_open = self.invocation.depth();

        // Guards still held by the producer release here
        self.render = None;
        let checked = lock(self.invocation.stack()).check();
        let tree = self.retire();
        checked?;

        if self.strict && still_open > 0 {
            return Err(ComposeError::UnclosedScopes {
                token,
                depth: still_open,
            });
        }

        let roots = tree.into_roots();
        debug!(
            %token,
            roots = roots.len(),
            attached = self.attached,
            "invocation completed"
        );
        Ok(Composition {
            roots,
            output,
            token,
        })
    }

    fn abort(&mut self, err: &ComposeError) {
        debug!(token = %self.invocation.token(), %err, "invocation aborted");
        self.render = None;
        self.retire();
    }

    fn retire(&mut self) -> ScopeArena<N> {
        self.live = false;
        let tree = lock(self.invocation.stack()).retire();
        self.registry.retire(self.invocation.token());
        tree
    }
}

impl<N: Attach, P: Render<N>> Drop for Driver<N, P> {
    fn drop(&mut self) {
        if self.live {
            warn!(token = %self.invocation.token(), "driver dropped before completion");
            self.render = None;
            self.retire();
        }
    }
}
