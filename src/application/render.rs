//! Lazy producers driven by the composer.
//!
//! A producer is resumed once per pull. Each `Produced::Child` is a
//! suspension point: control returns to the driver, which attaches the child
//! before resuming again. Producers open scopes through the `Invocation`
//! handed to `resume` and may keep the resulting guards across suspensions.

use std::fmt;

use crate::application::composer::{Composer, Composition};
use crate::application::scope::{Invocation, ScopeGuard};
use crate::application::{ComposeError, ComposeResult};
use crate::domain::Attach;

/// Outcome of one resume.
pub enum Produced<C, R> {
    /// A child for the innermost open scope; the producer is suspended.
    Child(C),
    /// The sequence is exhausted, with its terminal result.
    Finished(R),
}

impl<C: fmt::Debug, R: fmt::Debug> fmt::Debug for Produced<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Produced::Child(child) => f.debug_tuple("Child").field(child).finish(),
            Produced::Finished(output) => f.debug_tuple("Finished").field(output).finish(),
        }
    }
}

/// A lazy sequence of children ending in a terminal result.
pub trait Render<N: Attach> {
    type Output;

    /// Produce the next child or finish. Never called again after `Finished`
    /// or an error.
    fn resume(
        &mut self,
        invocation: &Invocation<N>,
    ) -> ComposeResult<Produced<N::Child, Self::Output>>;
}

/// Producer backed by a closure called on every resume.
pub struct FromFn<F>(F);

pub fn from_fn<N, R, F>(f: F) -> FromFn<F>
where
    N: Attach,
    F: FnMut(&Invocation<N>) -> ComposeResult<Produced<N::Child, R>>,
{
    FromFn(f)
}

impl<N, R, F> Render<N> for FromFn<F>
where
    N: Attach,
    F: FnMut(&Invocation<N>) -> ComposeResult<Produced<N::Child, R>>,
{
    type Output = R;

    fn resume(&mut self, invocation: &Invocation<N>) -> ComposeResult<Produced<N::Child, R>> {
        (self.0)(invocation)
    }
}

/// Producer that builds everything eagerly in a single resume, using
/// [`Invocation::scope`] and [`Invocation::emit`].
pub struct Once<F>(Option<F>);

pub fn once<N, R, F>(f: F) -> Once<F>
where
    N: Attach,
    F: FnOnce(&Invocation<N>) -> ComposeResult<R>,
{
    Once(Some(f))
}

impl<N, R, F> Render<N> for Once<F>
where
    N: Attach,
    F: FnOnce(&Invocation<N>) -> ComposeResult<R>,
{
    type Output = R;

    fn resume(&mut self, invocation: &Invocation<N>) -> ComposeResult<Produced<N::Child, R>> {
        let f = self.0.take().ok_or(ComposeError::Finished {
            token: invocation.token(),
        })?;
        Ok(Produced::Finished(f(invocation)?))
    }
}

/// One step of a [`Script`].
pub enum Event<N: Attach> {
    Open(N),
    Child(N::Child),
    Close,
}

impl<N: Attach> Event<N> {
    pub fn child(child: impl Into<N::Child>) -> Self {
        Event::Child(child.into())
    }
}

/// Guards owned by a script, released innermost first.
struct GuardStack<N: Attach>(Vec<ScopeGuard<N>>);

impl<N: Attach> Drop for GuardStack<N> {
    fn drop(&mut self) {
        while let Some(guard) = self.0.pop() {
            drop(guard);
        }
    }
}

/// Producer pulling open/child/close events from an iterator.
///
/// Events are pulled lazily: a scope is opened when its `Open` event is
/// reached, not when the script is built. Scopes left open when the events
/// run out stay open until the driver drops the script.
pub struct Script<N: Attach, I, R = ()> {
    events: I,
    open: GuardStack<N>,
    output: Option<R>,
}

pub fn script<N, I>(events: I) -> Script<N, I::IntoIter>
where
    N: Attach,
    I: IntoIterator<Item = Event<N>>,
{
    Script {
        events: events.into_iter(),
        open: GuardStack(Vec::new()),
        output: Some(()),
    }
}

impl<N: Attach, I, R> Script<N, I, R> {
    /// Set the terminal result reported when the events run out.
    pub fn returning<T>(self, output: T) -> Script<N, I, T> {
        Script {
            events: self.events,
            open: self.open,
            output: Some(output),
        }
    }
}

impl<N, I, R> Render<N> for Script<N, I, R>
where
    N: Attach,
    I: Iterator<Item = Event<N>>,
{
    type Output = R;

    fn resume(&mut self, invocation: &Invocation<N>) -> ComposeResult<Produced<N::Child, R>> {
        loop {
            match self.events.next() {
                Some(Event::Open(node)) => {
                    let guard = invocation.open(node)?;
                    self.open.0.push(guard);
                }
                Some(Event::Close) => match self.open.0.pop() {
                    Some(guard) => guard.close()?,
                    None => {
                        return Err(ComposeError::UnbalancedClose {
                            token: invocation.token(),
                        })
                    }
                },
                Some(Event::Child(child)) => return Ok(Produced::Child(child)),
                None => {
                    let output = self.output.take().ok_or(ComposeError::Finished {
                        token: invocation.token(),
                    })?;
                    return Ok(Produced::Finished(output));
                }
            }
        }
    }
}

/// A reusable component: renders a producer from its arguments.
pub trait Composable<N: Attach> {
    type Args;
    type Output;
    type Render: Render<N, Output = Self::Output>;

    fn render(&self, args: Self::Args) -> Self::Render;

    /// Run one invocation of this component.
    fn compose(
        &self,
        composer: &Composer<N>,
        args: Self::Args,
    ) -> ComposeResult<Composition<N, Self::Output>> {
        composer.run_with(|args| self.render(args), args)
    }
}
