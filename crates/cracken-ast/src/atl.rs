//! Builders for `renpy.atl` statements.

use std::fmt::Write as _;

use cracken_core::pickle::Value;

use crate::{
    fields::{fields_of, seq, text_of, texts, Fields},
    reconstruct::Reconstructor,
    registry::Registry,
    Node, NodeKind,
};

pub(crate) fn register(r: &mut Registry) {
    r.register_all(
        "renpy.atl",
        &[
            ("RawBlock", raw_block),
            ("RawMultipurpose", multipurpose),
            ("RawContainsExpr", contains_expr),
            ("RawChild", child),
            ("RawRepeat", repeat),
            ("RawParallel", parallel),
            ("RawChoice", choice),
            ("RawTime", time),
            ("RawOn", on),
            ("RawEvent", event),
            ("RawFunction", function),
        ],
    );
}

/// Statements of an ATL block attached to `show`, `image`, `transform`…,
/// with the `animation` line first when set.
pub fn body(block: Option<&Value>, rc: &mut Reconstructor<'_>) -> Vec<Node> {
    block.and_then(fields_of).map(|f| statements(&f, rc)).unwrap_or_default()
}

fn statements(f: &Fields, rc: &mut Reconstructor<'_>) -> Vec<Node> {
    let mut out = Vec::new();
    if f.bool_or("animation", false) {
        out.push(Node::valued("animation"));
    }
    out.extend(rc.nodes(f.get("statements")));
    out
}

fn raw_block(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let children = statements(f, rc);
    if f.list("statements").len() < 2 {
        Node::excluded(NodeKind::AtlBlock).with_children(children)
    } else {
        Node::new(NodeKind::AtlBlock).with_children(children)
    }
}

/// `(expr, with)` / `(name, value)` pairs.
fn pairs(f: &Fields, key: &str) -> Vec<(String, Option<String>)> {
    f.list(key)
        .iter()
        .filter_map(|item| {
            let p = seq(item);
            Some((text_of(p.first()?)?, p.get(1).and_then(text_of)))
        })
        .collect()
}

fn multipurpose(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    let expressions = pairs(f, "expressions");
    let properties = pairs(f, "properties");
    let duration = f.str_or("duration", "0");

    let head = match (f.opt_str("warper"), f.opt_str("warp_function")) {
        (Some(warper), _) => Some(format!("{warper} {duration}")),
        (None, Some(function)) => Some(format!("warp {function} {duration}")),
        (None, None) => None,
    };

    if let Some(mut line) = head {
        for spline in f.list("splines") {
            let p = seq(&spline);
            let Some(name) = p.first().and_then(text_of) else { continue };
            let knots = p.get(1).map(texts).unwrap_or_default();
            if let Some((end, rest)) = knots.split_last() {
                let _ = write!(line, " {name} {end}");
                for k in rest {
                    let _ = write!(line, " knot {k}");
                }
            }
        }
        for (expr, with) in &expressions {
            let _ = write!(line, " {expr}");
            if let Some(with) = with {
                let _ = write!(line, " with {with}");
            }
        }
        for (name, value) in &properties {
            let _ = write!(line, " {name} {}", value.as_deref().unwrap_or("None"));
        }
        if let Some(revolution) = f.opt_str("revolution") {
            let _ = write!(line, " {revolution}");
        }
        let circles = f.str_or("circles", "0");
        if circles != "0" {
            let _ = write!(line, " circles {circles}");
        }
        return Node::new(NodeKind::AtlMultipurpose { line, block: false });
    }

    if expressions.is_empty() && properties.is_empty() {
        return Node::excluded(NodeKind::AtlMultipurpose { line: String::new(), block: false });
    }

    let lines = expressions
        .iter()
        .map(|(e, w)| match w {
            Some(w) => format!("{e} with {w}"),
            None => e.clone(),
        })
        .chain(properties.iter().map(|(n, v)| format!("{n} {}", v.as_deref().unwrap_or("None"))))
        .map(Node::valued)
        .collect();
    Node::new(NodeKind::AtlMultipurpose { line: "contains".into(), block: true }).with_children(lines)
}

fn contains_expr(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::AtlContainsExpr { expr: f.str_or("expression", "None") })
}

fn child(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    Node::excluded(NodeKind::AtlChild).with_children(rc.nodes(f.get("children")))
}

fn repeat(f: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::AtlRepeat { count: f.opt_str("repeats") }) }

fn parallel(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let parts = f.list("blocks").iter().map(|b| Node::valued("parallel:").with_children(body(Some(b), rc))).collect();
    Node::excluded(NodeKind::AtlParallel).with_children(parts)
}

fn choice(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let parts = f
        .list("choices")
        .iter()
        .map(|c| {
            let p = seq(c);
            let header = match p.first().and_then(text_of).filter(|chance| chance != "1.0") {
                Some(chance) => format!("choice {chance}:"),
                None => "choice:".to_owned(),
            };
            Node::valued(header).with_children(body(p.get(1), rc))
        })
        .collect();
    Node::excluded(NodeKind::AtlChoice).with_children(parts)
}

fn time(f: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::AtlTime { time: f.str_or("time", "0") }) }

/// Handlers sharing one block object print as `on a, b:`.
fn on(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let mut groups: Vec<(Vec<String>, Value)> = Vec::new();
    for (name, block) in f.entries("handlers") {
        let Some(name) = text_of(&name) else { continue };
        match groups.iter_mut().find(|(_, b)| b.ptr_eq(&block)) {
            Some((names, _)) => names.push(name),
            None => groups.push((vec![name], block)),
        }
    }
    let parts = groups
        .into_iter()
        .map(|(names, block)| Node::valued(format!("on {}:", names.join(", "))).with_children(body(Some(&block), rc)))
        .collect();
    Node::excluded(NodeKind::AtlOn).with_children(parts)
}

fn event(f: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::AtlEvent { name: f.str_or("name", "") }) }

fn function(f: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::AtlFunction { expr: f.str_or("expr", "None") }) }
