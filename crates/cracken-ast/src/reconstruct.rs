//! Object graph → owned tree.

use std::rc::Rc;

use cracken_core::pickle::{ClassTag, Value};
#[cfg(feature = "serde")]
use serde::Serialize;
use thiserror::Error;

use crate::{
    fields::{seq, Fields},
    registry::Registry,
    Node, NodeKind,
};

/// Deepest statement nesting followed before giving up on a branch.
pub const MAX_DEPTH: usize = 256;

/// Recoverable problem met while rebuilding the tree. The offending value is
/// dropped; the rest of the file is still decompiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(tag = "kind", rename_all = "snake_case"))]
pub enum Diagnostic {
    /// Allow-listed but unregistered class, or a non-object where a statement belongs.
    #[error("unknown node kind `{class}`")]
    UnknownNodeKind {
        /// Qualified class name or value type.
        class: String,
    },
    /// A statement reachable from itself.
    #[error("reference cycle through `{class}` dropped")]
    Cycle {
        /// Qualified class name.
        class: String,
    },
    /// A field whose shape the builder could not use.
    #[error("`{class}`: field `{field}` {reason}")]
    BadField {
        /// Qualified class name.
        class: String,
        /// Field name.
        field: String,
        /// What was wrong.
        reason: String,
    },
    /// Nesting beyond [`MAX_DEPTH`].
    #[error("nesting deeper than {limit} at `{class}`")]
    TooDeep {
        /// Qualified class name.
        class: String,
        /// Limit that was hit.
        limit: usize,
    },
}

/// The top-level value is not the `(header, statements)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("top-level value is {found}, expected a 2-element sequence")]
pub struct ShapeError {
    /// What was found instead.
    pub found: String,
}

/// Builds nodes from objects, tracking the current path for cycle detection.
#[derive(Debug)]
pub struct Reconstructor<'r> {
    registry: &'r Registry,
    path: Vec<usize>,
    diagnostics: Vec<Diagnostic>,
}

impl<'r> Reconstructor<'r> {
    /// Fresh reconstructor over `registry`.
    pub fn new(registry: &'r Registry) -> Self { Self { registry, path: Vec::new(), diagnostics: Vec::new() } }

    /// Builds one statement. `None` when the value was dropped (a diagnostic is recorded).
    pub fn node(&mut self, value: &Value) -> Option<Node> {
        let Value::Object(obj) = value else {
            self.diagnose(Diagnostic::UnknownNodeKind { class: value.type_name().to_owned() });
            return None;
        };
        let class: Rc<ClassTag> = Rc::clone(&obj.borrow().class);
        let id = value.identity().unwrap_or_default();

        if self.path.contains(&id) {
            self.diagnose(Diagnostic::Cycle { class: class.qualified() });
            return None;
        }
        if self.path.len() >= MAX_DEPTH {
            self.diagnose(Diagnostic::TooDeep { class: class.qualified(), limit: MAX_DEPTH });
            return None;
        }
        let Some(builder) = self.registry.get(&class) else {
            self.diagnose(Diagnostic::UnknownNodeKind { class: class.qualified() });
            return None;
        };

        let fields = Fields::of(&obj.borrow());
        self.path.push(id);
        let mut node = builder(&fields, self);
        self.path.pop();
        if node.location.is_none() {
            node.location = fields.location();
        }
        Some(node)
    }

    /// Builds every statement of a sequence value, dropping the failures.
    pub fn nodes(&mut self, value: Option<&Value>) -> Vec<Node> {
        value.map(seq).unwrap_or_default().iter().filter_map(|v| self.node(v)).collect()
    }

    /// Records a recoverable problem.
    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        log::debug!("reconstruct: {diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize { self.path.len() }

    /// Problems recorded so far.
    pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }

    /// Consumes the reconstructor.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> { self.diagnostics }
}

/// Rebuilds the statement list (element `[1]` of `root`) under a Root node,
/// closed by a trailing blank line.
pub fn reconstruct(root: &Value, registry: &Registry) -> Result<(Node, Vec<Diagnostic>), ShapeError> {
    let top = seq(root);
    if top.len() != 2 {
        let found = match root {
            Value::List(_) | Value::Tuple(_) => format!("a {}-element {}", top.len(), root.type_name()),
            other => format!("a {}", other.type_name()),
        };
        return Err(ShapeError { found });
    }

    let mut rc = Reconstructor::new(registry);
    let mut tree = Node::new(NodeKind::Root).with_children(rc.nodes(Some(&top[1])));
    tree.push(Node::empty_line());
    log::debug!("reconstructed {} nodes, {} diagnostics", tree.size(), rc.diagnostics().len());
    Ok((tree, rc.into_diagnostics()))
}

#[cfg(test)]
mod tests {
    use cracken_core::pickle::{loads, AllowList, PickleWriter};
    use pretty_assertions::assert_eq;

    use super::*;

    fn decode(w: PickleWriter) -> Value {
        loads(&w.finish(), &AllowList::script()).unwrap_or_else(|e| panic!("decode failed: {e}"))
    }

    fn script(body: impl FnOnce(&mut PickleWriter)) -> Value {
        let mut w = PickleWriter::new();
        w.tuple(|w| {
            w.dict(|w| {
                w.str("version").int(5_003_000);
            });
            w.list(body);
        });
        decode(w)
    }

    #[test]
    fn wrong_shape() {
        let r = Registry::standard();
        let err = reconstruct(&Value::Int(3), &r).err();
        assert_eq!(err.map(|e| e.found), Some("a int".to_owned()));
        let err = reconstruct(&Value::tuple(vec![Value::None]), &r).err();
        assert_eq!(err.map(|e| e.to_string()), Some("top-level value is a 1-element tuple, expected a 2-element sequence".into()));
    }

    #[test]
    fn unknown_kinds_are_dropped() {
        let value = script(|w| {
            w.object("renpy.ast", "Pass", |_| {});
            w.object("renpy.ast", "Flux", |_| {});
            w.int(7);
        });
        let (tree, diags) = reconstruct(&value, &Registry::standard()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(tree.children().len(), 2);
        assert_eq!(
            diags,
            vec![
                Diagnostic::UnknownNodeKind { class: "renpy.ast.Flux".into() },
                Diagnostic::UnknownNodeKind { class: "int".into() },
            ]
        );
    }

    #[test]
    fn cycles_are_cut() {
        // label loop: block = [the label itself]
        let mut w = PickleWriter::new();
        w.tuple(|w| {
            w.none();
            w.list(|w| {
                w.global("renpy.ast", "Label").op(cracken_core::pickle::op::EMPTY_TUPLE).newobj().put(0);
                w.dict(|w| {
                    w.str("name").str("loop");
                    w.str("block").list(|w| {
                        w.get(0);
                    });
                });
                w.build();
            });
        });
        let (tree, diags) = reconstruct(&decode(w), &Registry::standard()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(diags, vec![Diagnostic::Cycle { class: "renpy.ast.Label".into() }]);
        let label = tree.child(0).unwrap_or_else(|| panic!("label missing"));
        assert_eq!(label.render(), "label loop:");
        assert_eq!(label.children().len(), 1);
    }

    #[test]
    fn location_is_attached() {
        let value = script(|w| {
            w.object("renpy.ast", "Pass", |w| {
                w.str("filename").str("game/script.rpy").str("linenumber").int(12);
            });
        });
        let (tree, _) = reconstruct(&value, &Registry::standard()).unwrap_or_else(|e| panic!("{e}"));
        let loc = tree.child(0).and_then(|n| n.location.clone());
        assert_eq!(loc.map(|l| l.to_string()).as_deref(), Some("game/script.rpy:12"));
    }
}
