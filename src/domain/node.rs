//! Append-child capability consumed by the composition engine.

use std::fmt::Display;

use termtree::Tree;

/// A tree element that takes ownership of appended children.
///
/// `Child` is whatever the node keeps in its children slot. A node opened as a
/// scope is converted into `Child` when it is stored under its parent, hence
/// the `From<Self>` bound.
pub trait Attach: Sized {
    type Child: From<Self>;

    /// Append `child` after all existing children.
    fn append_child(&mut self, child: Self::Child);
}

impl<D: Display> Attach for Tree<D> {
    type Child = Tree<D>;

    fn append_child(&mut self, child: Self::Child) {
        self.push(child);
    }
}
