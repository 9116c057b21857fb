//! Tree rewrites applied between reconstruction and printing.
//!
//! Every pass is a full traversal that leaves nodes alone when its
//! preconditions do not hold. None of them can fail.

use cracken_ast::{Node, NodeKind};
use log::{debug, warn};

use crate::format::Formatter;

/// State shared by the passes of one run.
pub struct PassCtx<'a> {
    /// Run embedded snippets through [`PassCtx::formatter`].
    pub prettify: bool,
    /// Snippet formatter.
    pub formatter: &'a dyn Formatter,
}

impl PassCtx<'_> {
    /// Formatted snippet, or the raw text when prettify is off or the formatter fails.
    fn format(&self, snippet: &str) -> String {
        if !self.prettify {
            return snippet.to_owned();
        }
        match self.formatter.format(snippet) {
            Ok(text) => text,
            Err(e) => {
                warn!("{e}; keeping the snippet unformatted");
                snippet.to_owned()
            }
        }
    }
}

/// One rewrite over the whole tree.
pub trait Pass {
    /// Short name for logs.
    fn name(&self) -> &'static str;
    /// Rewrites `root` in place.
    fn run(&mut self, ctx: &PassCtx<'_>, root: &mut Node);
}

/// The passes in the order they must run.
pub fn pipeline() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(SpliceExclude),
        Box::new(CollapseEmptyLines),
        Box::new(MaterializeSnippets),
        Box::new(Fold),
        Box::new(ReformatImage),
    ]
}

/// Runs [`pipeline`] over `root`.
pub fn rewrite(ctx: &PassCtx<'_>, root: &mut Node) {
    for mut pass in pipeline() {
        pass.run(ctx, root);
        debug!("pass {} done, {} nodes", pass.name(), root.size());
    }
}

/* ─────────────────────────── Splice ─────────────────────────── */

/// Replaces every `exclude` node by its children, then drops the bare
/// `return` that closes every compiled file.
#[derive(Debug, Default)]
pub struct SpliceExclude;

fn splice(node: &mut Node) {
    let children = node.take_children();
    let mut out = Vec::with_capacity(children.len());
    for mut child in children {
        splice(&mut child);
        if child.exclude {
            out.append(child.children_mut());
        } else {
            out.push(child);
        }
    }
    node.set_children(out);
}

impl Pass for SpliceExclude {
    fn name(&self) -> &'static str { "splice-exclude" }

    fn run(&mut self, _: &PassCtx<'_>, root: &mut Node) {
        splice(root);
        let last = root.children().iter().rposition(|c| !c.is_empty_line());
        if let Some(i) = last {
            let bare = matches!(root.children()[i].kind, NodeKind::Return { expr: None });
            if bare && root.children()[i].children().is_empty() {
                root.remove(i);
            }
        }
    }
}

/* ─────────────────────── Empty lines ─────────────────────── */

/// Keeps one blank line per separation point and drops the one ending the file.
///
/// A blank line directly after a subtree that already ends blank is removed,
/// so nested blocks keep the innermost separator only.
#[derive(Debug, Default)]
pub struct CollapseEmptyLines;

/// Returns whether the printed subtree ends with a blank line.
fn collapse(node: &mut Node) -> bool {
    let mut blank = false;
    node.children_mut().retain_mut(|child| {
        if child.is_empty_line() {
            let keep = !blank;
            blank = true;
            keep
        } else {
            blank = collapse(child);
            true
        }
    });
    blank
}

/// Pops the first blank line found along the last-child chain.
fn drop_final(node: &mut Node) {
    let mut cur = node;
    loop {
        if cur.children().last().is_some_and(Node::is_empty_line) {
            cur.children_mut().pop();
            return;
        }
        match cur.children_mut().last_mut() {
            Some(last) => cur = last,
            None => return,
        }
    }
}

impl Pass for CollapseEmptyLines {
    fn name(&self) -> &'static str { "collapse-empty-lines" }

    fn run(&mut self, _: &PassCtx<'_>, root: &mut Node) {
        collapse(root);
        drop_final(root);
    }
}

/* ───────────────────────── Snippets ───────────────────────── */

/// Splits every embedded code snippet into one node per physical line.
#[derive(Debug, Default)]
pub struct MaterializeSnippets;

fn indent_of(line: &str) -> usize { line.len() - line.trim_start_matches([' ', '\t']).len() }

/// Lines of `text` without surrounding blank lines and common indentation;
/// interior blank lines come back as empty strings.
pub(crate) fn snippet_lines(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r').trim_end()).collect();
    let Some(first) = lines.iter().position(|l| !l.is_empty()) else { return Vec::new() };
    let last = lines.iter().rposition(|l| !l.is_empty()).unwrap_or(first);
    let body = &lines[first..=last];
    let dedent = body.iter().filter(|l| !l.is_empty()).map(|l| indent_of(l)).min().unwrap_or(0);
    body.iter().map(|l| l.get(dedent..).unwrap_or("").to_owned()).collect()
}

fn line_node(line: String) -> Node {
    if line.is_empty() {
        Node::empty_line()
    } else {
        Node::valued(line)
    }
}

fn materialize(ctx: &PassCtx<'_>, node: &mut Node) {
    let children = node.take_children();
    let mut out = Vec::with_capacity(children.len());
    for mut child in children {
        if let NodeKind::Snippet(text) = &child.kind {
            let lines = snippet_lines(&ctx.format(text));
            if lines.is_empty() {
                out.push(Node::valued("pass"));
            } else {
                out.extend(lines.into_iter().map(line_node));
            }
        } else {
            materialize(ctx, &mut child);
            out.push(child);
        }
    }
    node.set_children(out);
}

impl Pass for MaterializeSnippets {
    fn name(&self) -> &'static str { "materialize-snippets" }
    fn run(&mut self, ctx: &PassCtx<'_>, root: &mut Node) { materialize(ctx, root); }
}

/* ───────────────────────── Folding ───────────────────────── */

/// Collapses single-statement wrappers: `init` around one statement first,
/// then one-line `python:` blocks into `$ code`.
#[derive(Debug, Default)]
pub struct Fold;

/// Init priority a statement gets when written without an `init` block.
fn implicit_priority(kind: &NodeKind) -> Option<i64> {
    match kind {
        NodeKind::Define { .. }
        | NodeKind::Default { .. }
        | NodeKind::Style { .. }
        | NodeKind::Transform { .. }
        | NodeKind::TranslateString { .. } => Some(0),
        NodeKind::Image { .. } => Some(500),
        NodeKind::SlScreen { .. } => Some(-500),
        _ => None,
    }
}

/// Replacement for an `init` block holding one statement.
fn fold_init(node: &mut Node) -> Option<Vec<Node>> {
    let NodeKind::Init { priority } = node.kind else { return None };
    let mut content = node.children().iter().enumerate().filter(|(_, c)| !c.is_empty_line());
    let (index, only) = content.next()?;
    if content.next().is_some() || index != 0 {
        return None;
    }

    if matches!(only.kind, NodeKind::Python { .. }) {
        let header = match priority {
            0 => format!("init {}", only.render()),
            p => format!("init {p} {}", only.render()),
        };
        let mut children = node.take_children();
        let mut python = children.remove(0);
        let mut body = python.take_children();
        body.append(&mut children);
        return Some(vec![Node::valued(header).with_children(body).at(python.location.take())]);
    }

    (implicit_priority(&only.kind) == Some(priority)).then(|| node.take_children())
}

fn fold_inits(node: &mut Node) {
    let children = node.take_children();
    let mut out = Vec::with_capacity(children.len());
    for mut child in children {
        fold_inits(&mut child);
        match fold_init(&mut child) {
            Some(replacement) => out.extend(replacement),
            None => out.push(child),
        }
    }
    node.set_children(out);
}

fn fold_pythons(node: &mut Node) {
    for child in node.children_mut() {
        fold_pythons(child);
    }
    let bare = matches!(node.kind, NodeKind::Python { hide: false, store: None, .. } | NodeKind::SlPython);
    if !bare || node.children().len() != 1 {
        return;
    }
    let line = match node.child(0).map(|c| &c.kind) {
        Some(NodeKind::Valued(code)) => format!("$ {code}"),
        _ => return,
    };
    node.kind = NodeKind::Valued(line);
    node.take_children();
}

impl Pass for Fold {
    fn name(&self) -> &'static str { "fold" }

    fn run(&mut self, _: &PassCtx<'_>, root: &mut Node) {
        fold_inits(root);
        fold_pythons(root);
    }
}

/* ────────────────────────── Images ────────────────────────── */

/// Moves the continuation lines of a multi-line `image NAME = …` value into
/// its body.
#[derive(Debug, Default)]
pub struct ReformatImage;

fn reformat_images(ctx: &PassCtx<'_>, node: &mut Node) {
    for child in node.children_mut() {
        reformat_images(ctx, child);
    }
    let NodeKind::Image { expr: Some(expr), .. } = &mut node.kind else { return };
    if !ctx.prettify && !expr.contains('\n') {
        return;
    }

    let text = ctx.format(expr);
    let mut lines = text.lines().map(str::trim_end);
    let Some(first) = lines.next() else { return };
    *expr = first.to_owned();

    let mut rest: Vec<String> = lines.map(|l| l.strip_prefix("    ").unwrap_or(l).to_owned()).collect();
    while rest.last().is_some_and(String::is_empty) {
        rest.pop();
    }
    for line in rest {
        node.push(line_node(line));
    }
}

impl Pass for ReformatImage {
    fn name(&self) -> &'static str { "reformat-image" }
    fn run(&mut self, ctx: &PassCtx<'_>, root: &mut Node) { reformat_images(ctx, root); }
}

/* ─────────────────────────── Tests ─────────────────────────── */
