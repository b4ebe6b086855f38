//! Child storage with the single/sequence unwrap rule.
//!
//! A node with one child stores it unwrapped; appending a second converts the
//! storage to an ordered sequence. Consumers always see a logical sequence:
//! `Single(x)` compares, iterates and indexes like `Many(vec![x])`.

use std::slice;

use serde::{Serialize, Serializer};

/// Children of a node.
#[derive(Debug, Clone)]
pub enum Children<T> {
    Empty,
    Single(T),
    Many(Vec<T>),
}

impl<T> Children<T> {
    /// Append a child, promoting `Single` to `Many` on the second append.
    pub fn push(&mut self, child: T) {
        *self = match std::mem::replace(self, Children::Empty) {
            Children::Empty => Children::Single(child),
            Children::Single(first) => Children::Many(vec![first, child]),
            Children::Many(mut all) => {
                all.push(child);
                Children::Many(all)
            }
        };
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Children::Empty => &[],
            Children::Single(child) => slice::from_ref(child),
            Children::Many(all) => all,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Children::Empty => Vec::new(),
            Children::Single(child) => vec![child],
            Children::Many(all) => all,
        }
    }
}

impl<T> Default for Children<T> {
    fn default() -> Self {
        Children::Empty
    }
}

impl<T: PartialEq> PartialEq for Children<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for Children<T> {}

impl<T> From<Vec<T>> for Children<T> {
    fn from(all: Vec<T>) -> Self {
        all.into_iter().collect()
    }
}

impl<T> FromIterator<T> for Children<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut children = Children::Empty;
        for child in iter {
            children.push(child);
        }
        children
    }
}

impl<'a, T> IntoIterator for &'a Children<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> IntoIterator for Children<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

/// Serializes as `null`, the bare child, or an array of children.
impl<T: Serialize> Serialize for Children<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Children::Empty => serializer.serialize_none(),
            Children::Single(child) => child.serialize(serializer),
            Children::Many(all) => all.serialize(serializer),
        }
    }
}
