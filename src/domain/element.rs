//! Ready-made attachable node for callers that do not bring their own.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use termtree::Tree;

use crate::domain::children::Children;
use crate::domain::node::Attach;

/// A tagged node with string properties and mixed text/element children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, String>,
    pub children: Children<Content>,
}

/// One entry in an element's children slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Element(Box<Element>),
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            props: BTreeMap::new(),
            children: Children::Empty,
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn set_prop(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.props.insert(key.into(), value.into());
    }

    /// Child elements in order, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Content::Element(element) => Some(&**element),
            Content::Text(_) => None,
        })
    }

    /// First descendant (depth-first, including self) with the given tag.
    pub fn find(&self, tag: &str) -> Option<&Element> {
        if self.tag == tag {
            return Some(self);
        }
        self.elements().find_map(|child| child.find(tag))
    }

    /// Concatenated text of all descendants in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Content::Text(text) => out.push_str(text),
                Content::Element(element) => element.collect_text(out),
            }
        }
    }
}

impl Attach for Element {
    type Child = Content;

    fn append_child(&mut self, child: Content) {
        self.children.push(child);
    }
}

impl From<Element> for Content {
    fn from(element: Element) -> Self {
        Content::Element(Box::new(element))
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if !self.props.is_empty() {
            let props: Vec<String> = self
                .props
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "[{}]", props.join(" "))?;
        }
        Ok(())
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(text) => write!(f, "{:?}", text),
            Content::Element(element) => write!(f, "{}", element),
        }
    }
}

/// Display view of a finished tree.
pub trait Outline {
    fn to_tree(&self) -> Tree<String>;
}

impl Outline for Element {
    fn to_tree(&self) -> Tree<String> {
        let leaves: Vec<_> = self.children.iter().map(|c| c.to_tree()).collect();
        Tree::new(self.to_string()).with_leaves(leaves)
    }
}

impl Outline for Content {
    fn to_tree(&self) -> Tree<String> {
        match self {
            Content::Text(_) => Tree::new(self.to_string()),
            Content::Element(element) => element.to_tree(),
        }
    }
}
