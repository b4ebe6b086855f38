use std::fmt;

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::{instrument, warn};

use crate::domain::node::Attach;

/// Payload of an arena entry: an opened scope node or a produced child.
pub enum Slot<N: Attach> {
    Scope(N),
    Leaf(N::Child),
}

impl<N> fmt::Debug for Slot<N>
where
    N: Attach + fmt::Debug,
    N::Child: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Scope(node) => f.debug_tuple("Scope").field(node).finish(),
            Slot::Leaf(child) => f.debug_tuple("Leaf").field(child).finish(),
        }
    }
}

impl<N> fmt::Display for Slot<N>
where
    N: Attach + fmt::Display,
    N::Child: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Scope(node) => write!(f, "{}", node),
            Slot::Leaf(child) => write!(f, "{}", child),
        }
    }
}

/// Tree entry in the arena-based composition structure.
pub struct ArenaEntry<N: Attach> {
    pub slot: Slot<N>,
    /// Indices of children in attachment order
    pub children: Vec<Index>,
}

impl<N> fmt::Debug for ArenaEntry<N>
where
    N: Attach + fmt::Debug,
    N::Child: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaEntry")
            .field("slot", &self.slot)
            .field("children", &self.children)
            .finish()
    }
}

/// Arena holding the tree of one invocation while it is being composed.
///
/// Each entry joins its parent's child list when it is inserted, so the shape
/// of the tree is final at attachment time. External nodes only receive their
/// children when the arena is folded by [`ScopeArena::into_roots`].
pub struct ScopeArena<N: Attach> {
    arena: Arena<ArenaEntry<N>>,
    /// Top-level scopes in opening order
    roots: Vec<Index>,
}

impl<N: Attach> Default for ScopeArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Attach> ScopeArena<N> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            roots: Vec::new(),
        }
    }

    #[instrument(level = "trace", skip(self, slot))]
    pub fn insert(&mut self, slot: Slot<N>, parent: Option<Index>) -> Index {
        let entry = ArenaEntry {
            slot,
            children: Vec::new(),
        };
        let idx = self.arena.insert(entry);

        match parent {
            Some(parent_idx) => {
                if let Some(parent) = self.arena.get_mut(parent_idx) {
                    parent.children.push(idx);
                } else {
                    warn!(?parent_idx, "parent missing from arena, entry left detached");
                }
            }
            None => self.roots.push(idx),
        }

        idx
    }

    pub fn get(&self, idx: Index) -> Option<&ArenaEntry<N>> {
        self.arena.get(idx)
    }

    pub fn get_mut(&mut self, idx: Index) -> Option<&mut ArenaEntry<N>> {
        self.arena.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Fold the arena into external nodes, appending children bottom-up in
    /// recorded order. Returns the top-level scope nodes in opening order.
    #[instrument(level = "trace", skip(self))]
    pub fn into_roots(mut self) -> Vec<N> {
        let roots = std::mem::take(&mut self.roots);
        roots
            .into_iter()
            .filter_map(|idx| match self.fold(idx) {
                Some(Slot::Scope(node)) => Some(node),
                _ => None,
            })
            .collect()
    }

    fn fold(&mut self, idx: Index) -> Option<Slot<N>> {
        let entry = self.arena.remove(idx)?;
        match entry.slot {
            Slot::Scope(mut node) => {
                for child in entry.children {
                    match self.fold(child) {
                        Some(Slot::Scope(inner)) => node.append_child(N::Child::from(inner)),
                        Some(Slot::Leaf(leaf)) => node.append_child(leaf),
                        None => {}
                    }
                }
                Some(Slot::Scope(node))
            }
            leaf => Some(leaf),
        }
    }
}

impl<N> ScopeArena<N>
where
    N: Attach + fmt::Display,
    N::Child: fmt::Display,
{
    /// Display trees of the partially composed state, one per root.
    pub fn to_trees(&self) -> Vec<Tree<String>> {
        fn build<N>(arena: &ScopeArena<N>, idx: Index) -> Tree<String>
        where
            N: Attach + fmt::Display,
            N::Child: fmt::Display,
        {
            match arena.get(idx) {
                Some(entry) => {
                    let leaves: Vec<_> =
                        entry.children.iter().map(|&c| build(arena, c)).collect();
                    Tree::new(entry.slot.to_string()).with_leaves(leaves)
                }
                None => Tree::new("<missing>".to_string()),
            }
        }

        self.roots.iter().map(|&root| build(self, root)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::element::{Content, Element};

    #[test]
    fn given_nested_entries_when_folding_then_children_follow_insert_order() {
        let mut arena: ScopeArena<Element> = ScopeArena::new();
        let root = arena.insert(Slot::Scope(Element::new("div")), None);
        arena.insert(Slot::Leaf("a".into()), Some(root));
        let inner = arena.insert(Slot::Scope(Element::new("p")), Some(root));
        arena.insert(Slot::Leaf("b".into()), Some(inner));
        arena.insert(Slot::Leaf("c".into()), Some(root));

        assert_eq!(arena.len(), 5);

        let roots = arena.into_roots();
        assert_eq!(roots.len(), 1);
        let div = &roots[0];
        assert_eq!(div.children.len(), 3);
        assert_eq!(div.children.get(0), Some(&Content::from("a")));
        assert!(matches!(div.children.get(1), Some(Content::Element(p)) if p.text() == "b"));
        assert_eq!(div.children.get(2), Some(&Content::from("c")));
    }
}
