//! cracken-ast — Ren'Py script tree rebuilt from a decoded `.rpyc` payload.
//!
//! - [`Node`]: owned tree node (kind, `exclude` flag, location, children)
//! - [`NodeKind`]: every statement, ATL and screen-language kind plus its render rule
//! - [`Registry`]: compiled-in `(module, name) → builder` table
//! - [`reconstruct`]: object graph → tree, with recoverable [`Diagnostic`]s
//!
//! The source graph may share or even cycle through substructures; the tree
//! never does. Every visit builds a fresh node and a revisited object on the
//! current path is dropped with [`Diagnostic::Cycle`].
//!
//! # Exemple
//! ```rust
//! use cracken_ast::{Node, NodeKind, Visit};
//!
//! let mut root = Node::new(NodeKind::Root);
//! root.push(Node::new(NodeKind::Pass));
//! let lines: Vec<_> = root
//!     .walk()
//!     .filter_map(|v| match v { Visit::Node(n) => Some(n.render()), Visit::BlockEnd => None })
//!     .collect();
//! assert_eq!(lines, ["pass"]);
//! ```

#![deny(missing_docs)]

pub mod atl;
pub mod fields;
pub mod kind;
pub mod reconstruct;
pub mod registry;
pub mod screen;
pub mod script;
pub mod signature;

use cracken_core::Location;

pub use fields::{fields_of, Fields};
pub use kind::{NodeKind, PartKeyword};
pub use reconstruct::{reconstruct, Diagnostic, Reconstructor, ShapeError, MAX_DEPTH};
pub use registry::{Builder, Registry};

/* ─────────────────────────── Node ─────────────────────────── */

/// One line of script plus its indented body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Kind and kind-specific attributes.
    pub kind: NodeKind,
    /// Pure grouping node, spliced away before printing.
    pub exclude: bool,
    /// Source position when the object carried one.
    pub location: Option<Location>,
    children: Vec<Node>,
}

impl Node {
    /// Childless, printable node.
    pub fn new(kind: NodeKind) -> Self { Self { kind, exclude: false, location: None, children: Vec::new() } }

    /// Grouping node whose children take its place.
    pub fn excluded(kind: NodeKind) -> Self { Self { exclude: true, ..Self::new(kind) } }

    /// Literal text line.
    pub fn valued(text: impl Into<String>) -> Self { Self::new(NodeKind::Valued(text.into())) }

    /// Blank separator.
    pub fn empty_line() -> Self { Self::new(NodeKind::EmptyLine) }

    /// Builder-style children setter.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// Builder-style location setter.
    #[must_use]
    pub fn at(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Header line.
    pub fn render(&self) -> String { self.kind.render() }

    /// True for blank separators.
    pub fn is_empty_line(&self) -> bool { matches!(self.kind, NodeKind::EmptyLine) }

    /// Children in order.
    pub fn children(&self) -> &[Node] { &self.children }
    /// Mutable child list; the tree stays owned top-down whatever is done with it.
    pub fn children_mut(&mut self) -> &mut Vec<Node> { &mut self.children }
    /// Child at `index`.
    pub fn child(&self, index: usize) -> Option<&Node> { self.children.get(index) }
    /// Appends a child.
    pub fn push(&mut self, child: Node) { self.children.push(child); }
    /// Inserts a child at `index` (clamped to the end).
    pub fn insert(&mut self, index: usize, child: Node) {
        let index = index.min(self.children.len());
        self.children.insert(index, child);
    }
    /// Removes and returns the child at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Node> {
        (index < self.children.len()).then(|| self.children.remove(index))
    }
    /// Replaces the child at `index` with `replacement`, shifting later children.
    pub fn splice(&mut self, index: usize, replacement: Vec<Node>) {
        if index < self.children.len() {
            self.children.splice(index..=index, replacement);
        }
    }
    /// Moves the children out.
    pub fn take_children(&mut self) -> Vec<Node> { std::mem::take(&mut self.children) }
    /// Replaces all children.
    pub fn set_children(&mut self, children: Vec<Node>) { self.children = children; }

    /// Children that are not blank separators.
    pub fn content(&self) -> impl Iterator<Item = &Node> { self.children.iter().filter(|c| !c.is_empty_line()) }

    /// Pre-order walk over the descendants (not `self`), with a
    /// [`Visit::BlockEnd`] after each node's subtree.
    pub fn walk(&self) -> Walk<'_> { Walk { stack: vec![(&self.children, 0)] } }

    /// Number of nodes in the subtree, `self` included.
    pub fn size(&self) -> usize { 1 + self.children.iter().map(Node::size).sum::<usize>() }
}

/* ─────────────────────────── Walk ─────────────────────────── */

/// Walker event.
#[derive(Debug, Clone, Copy)]
pub enum Visit<'a> {
    /// Entering a node; its subtree follows.
    Node(&'a Node),
    /// The subtree of the last entered node is done (dedent).
    BlockEnd,
}

/// Iterator returned by [`Node::walk`].
#[derive(Debug)]
pub struct Walk<'a> {
    stack: Vec<(&'a [Node], usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (nodes, idx) = self.stack.last_mut()?;
        let nodes: &'a [Node] = *nodes;
        if let Some(node) = nodes.get(*idx) {
            *idx += 1;
            self.stack.push((&node.children, 0));
            return Some(Visit::Node(node));
        }
        self.stack.pop();
        if self.stack.is_empty() {
            None
        } else {
            Some(Visit::BlockEnd)
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn trace(root: &Node) -> Vec<String> {
        root.walk()
            .map(|v| match v {
                Visit::Node(n) => n.kind.name().to_owned(),
                Visit::BlockEnd => "<".to_owned(),
            })
            .collect()
    }

    #[test]
    fn walk_emits_block_end_after_every_node() {
        let root = Node::new(NodeKind::Root).with_children(vec![
            Node::new(NodeKind::Label { name: "a".into(), parameters: None, hide: false })
                .with_children(vec![Node::new(NodeKind::Pass)]),
            Node::new(NodeKind::Pass),
        ]);
        assert_eq!(trace(&root), ["label", "pass", "<", "<", "pass", "<"]);
        assert_eq!(Node::new(NodeKind::Root).walk().count(), 0);
    }

    #[test]
    fn splice_and_remove() {
        let mut root = Node::new(NodeKind::Root)
            .with_children(vec![Node::valued("a"), Node::excluded(NodeKind::If), Node::valued("d")]);
        root.splice(1, vec![Node::valued("b"), Node::valued("c")]);
        let texts: Vec<_> = root.children().iter().map(Node::render).collect();
        assert_eq!(texts, ["a", "b", "c", "d"]);
        assert!(root.remove(9).is_none());
        assert_eq!(root.remove(0).map(|n| n.render()).as_deref(), Some("a"));
        root.insert(99, Node::empty_line());
        assert_eq!(root.content().count(), 3);
        assert_eq!(root.size(), 5);
    }
}
