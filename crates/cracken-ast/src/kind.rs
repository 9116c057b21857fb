//! Node kinds and their header render rules.
//!
//! A node prints as one header line (`render()`); its body is its children,
//! one indentation level deeper. Grouping kinds are marked `exclude` by their
//! builders and never reach the printer.

use std::fmt::Write as _;

use crate::signature::quote;

/// Keyword of one arm of an `if` / `showif` group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKeyword {
    /// First arm of an `if`.
    If,
    /// Later arm with a condition.
    Elif,
    /// Arm without condition.
    Else,
    /// First arm of a screen `showif`.
    ShowIf,
}

impl PartKeyword {
    /// Script keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::ShowIf => "showif",
        }
    }
}

/// Every kind a [`crate::Node`] can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /* ───────────── Synthetic ───────────── */
    /// Synthetic top of the tree; never printed.
    Root,
    /// Blank separator line.
    EmptyLine,
    /// Literal text line.
    Valued(String),
    /// Raw multi-line source waiting to be split into lines.
    Snippet(String),
    /// One arm of a switch group.
    Part {
        /// `if` / `elif` / `else` / `showif`.
        keyword: PartKeyword,
        /// Condition (absent for `else`).
        condition: Option<String>,
    },

    /* ───────────── Script statements ───────────── */
    /// `label NAME(params)[ hide]:`
    Label {
        /// Label name.
        name: String,
        /// Rendered parameter list with parentheses.
        parameters: Option<String>,
        /// `hide` flag.
        hide: bool,
    },
    /// `init[ PRIORITY]:`
    Init {
        /// Init priority (omitted when 0).
        priority: i64,
    },
    /// `python[ early][ hide][ in STORE]:`
    Python {
        /// `EarlyPython`.
        early: bool,
        /// `hide` flag.
        hide: bool,
        /// Store name without the `store.` prefix; `None` for the default store.
        store: Option<String>,
    },
    /// Dialogue line.
    Say {
        /// Speaking character.
        who: Option<String>,
        /// Image attributes.
        attributes: Vec<String>,
        /// Temporary attributes (after `@`).
        temporary: Vec<String>,
        /// Dialogue text, unescaped.
        what: String,
        /// Rendered argument list.
        arguments: Option<String>,
        /// False renders `nointeract`.
        interact: bool,
        /// `with` transition.
        with: Option<String>,
    },
    /// `show IMSPEC[:]`
    Show {
        /// Rendered image specifier.
        imspec: String,
        /// Carries an ATL body.
        atl: bool,
    },
    /// `show layer L[ at A][:]`
    ShowLayer {
        /// Layer name.
        layer: String,
        /// `at` transforms.
        at_list: Vec<String>,
        /// Carries an ATL body.
        atl: bool,
    },
    /// `camera[ L][ at A][:]`
    Camera {
        /// Layer name, printed whenever set.
        layer: Option<String>,
        /// `at` transforms.
        at_list: Vec<String>,
        /// Carries an ATL body.
        atl: bool,
    },
    /// `scene[ IMSPEC][ onlayer L][:]`
    Scene {
        /// Rendered image specifier without layer.
        imspec: Option<String>,
        /// Layer (`master` omitted).
        layer: Option<String>,
        /// Carries an ATL body.
        atl: bool,
    },
    /// `hide IMSPEC`
    Hide {
        /// Rendered image specifier.
        imspec: String,
    },
    /// `with EXPR`
    With {
        /// Transition expression.
        expr: String,
    },
    /// `call[ expression] TARGET[(ARGS)]`
    Call {
        /// Label or expression.
        target: String,
        /// `expression` form.
        expression: bool,
        /// Rendered argument list.
        arguments: Option<String>,
    },
    /// `return[ EXPR]`
    Return {
        /// Returned expression.
        expr: Option<String>,
    },
    /// `jump[ expression] TARGET`
    Jump {
        /// Label or expression.
        target: String,
        /// `expression` form.
        expression: bool,
    },
    /// `pass`
    Pass,
    /// `while COND:`
    While {
        /// Loop condition.
        condition: String,
    },
    /// Switch group of [`NodeKind::Part`]s.
    If,
    /// `menu[(ARGS)]:`
    Menu {
        /// Rendered argument list.
        arguments: Option<String>,
    },
    /// One menu choice or caption.
    MenuItem {
        /// Choice text.
        label: String,
        /// Rendered per-item arguments.
        arguments: Option<String>,
        /// Condition (`True` dropped by the builder).
        condition: Option<String>,
        /// Caption without a block.
        caption: bool,
    },
    /// Creator-defined statement line.
    UserStatement {
        /// Source line.
        line: String,
    },
    /// Compiler bookkeeping after a user statement.
    PostUserStatement,
    /// `define [STORE.]NAME[[INDEX]] OP EXPR`
    Define {
        /// Store suffix (`x` for `store.x`).
        store: Option<String>,
        /// Variable name.
        name: String,
        /// Subscript expression.
        index: Option<String>,
        /// Assignment operator.
        operator: String,
        /// Value expression.
        expr: String,
    },
    /// `default [STORE.]NAME = EXPR`
    Default {
        /// Store suffix.
        store: Option<String>,
        /// Variable name.
        name: String,
        /// Value expression.
        expr: String,
    },
    /// `image NAME = EXPR` or `image NAME:` with ATL.
    Image {
        /// Space-joined image name.
        name: String,
        /// Value expression; `None` for the ATL form.
        expr: Option<String>,
    },
    /// `transform NAME(params):`
    Transform {
        /// Transform name.
        name: String,
        /// Rendered parameter list.
        parameters: Option<String>,
    },
    /// `style NAME[ is P][ clear][ take T][ variant V][:]`
    Style {
        /// Style name.
        name: String,
        /// Parent style.
        parent: Option<String>,
        /// `clear` flag.
        clear: bool,
        /// `take` style.
        take: Option<String>,
        /// `variant`.
        variant: Option<String>,
        /// Has property lines.
        block: bool,
    },
    /// Wrapper around a screen definition.
    Screen,
    /// `translate LANG IDENTIFIER:`
    Translate {
        /// Language; `None` marks the default-language wrapper.
        language: Option<String>,
        /// Translation identifier.
        identifier: String,
    },
    /// Bookkeeping closing a translate block.
    EndTranslate,
    /// `translate LANG strings:`
    TranslateString {
        /// Language.
        language: String,
    },
    /// `translate LANG python:`
    TranslatePython {
        /// Language.
        language: String,
    },
    /// `translate LANG <inner header>`
    TranslateBlock {
        /// Language.
        language: String,
        /// Header of the wrapped statement.
        inner: String,
    },
    /// `rpy REST`
    Rpy {
        /// Tokens after `rpy`.
        rest: Vec<String>,
    },

    /* ───────────── ATL ───────────── */
    /// `block:`
    AtlBlock,
    /// Warper/property line or `contains:` group.
    AtlMultipurpose {
        /// Header text.
        line: String,
        /// Ends with `:`.
        block: bool,
    },
    /// `contains EXPR`
    AtlContainsExpr {
        /// Child expression.
        expr: String,
    },
    /// Wrapper around child blocks.
    AtlChild,
    /// `repeat[ N]`
    AtlRepeat {
        /// Repeat count.
        count: Option<String>,
    },
    /// Wrapper around `parallel:` parts.
    AtlParallel,
    /// Wrapper around `choice:` parts.
    AtlChoice,
    /// `time T`
    AtlTime {
        /// Time expression.
        time: String,
    },
    /// Wrapper around `on …:` handlers.
    AtlOn,
    /// `event NAME`
    AtlEvent {
        /// Event name.
        name: String,
    },
    /// `function EXPR`
    AtlFunction {
        /// Function expression.
        expr: String,
    },

    /* ───────────── Screen language ───────────── */
    /// `screen NAME(params):`
    SlScreen {
        /// Screen name.
        name: String,
        /// Rendered parameter list.
        parameters: Option<String>,
    },
    /// Displayable statement.
    SlDisplayable {
        /// Statement keyword (`text`, `vbox`, …).
        keyword: String,
        /// Positional arguments.
        positional: Vec<String>,
        /// `as` variable.
        variable: Option<String>,
        /// Inline `key value` pairs.
        keywords: Vec<(String, String)>,
        /// Has a body.
        block: bool,
    },
    /// Switch group of screen `if` / `showif` parts.
    SlIf {
        /// `showif` rather than `if`.
        showif: bool,
    },
    /// Bare keyword/children block, spliced into its parent.
    SlBlock,
    /// `for VAR[ index IDX] in EXPR:`
    SlFor {
        /// Loop variable.
        variable: String,
        /// `index` expression.
        index: Option<String>,
        /// Iterated expression.
        expr: String,
    },
    /// `python:` inside a screen.
    SlPython,
    /// `pass` inside a screen.
    SlPass,
    /// `default VAR = EXPR` inside a screen.
    SlDefault {
        /// Variable.
        variable: String,
        /// Value.
        expr: String,
    },
    /// `use TARGET[(ARGS)][ id ID][:]` / `use expression E pass (ARGS)`.
    SlUse {
        /// Screen name or expression.
        target: String,
        /// `expression` form.
        expression: bool,
        /// Rendered argument list.
        arguments: Option<String>,
        /// `id` expression.
        id: Option<String>,
        /// Has a transcluded block.
        block: bool,
    },
    /// `transclude`
    SlTransclude,
    /// Creator-defined screen statement.
    SlCustomUse {
        /// Statement name.
        target: String,
        /// Positional arguments.
        positional: Vec<String>,
        /// Has a block.
        block: bool,
    },
}

fn with_colon(mut s: String, colon: bool) -> String {
    if colon {
        s.push(':');
    }
    s
}

fn store_prefix(store: Option<&String>) -> String { store.map(|s| format!("{s}.")).unwrap_or_default() }

impl NodeKind {
    /// Header line of the node (empty for blank separators and wrappers).
    pub fn render(&self) -> String {
        use NodeKind::*;
        match self {
            Root | EmptyLine | If | Screen | PostUserStatement | EndTranslate | AtlChild | AtlParallel | AtlChoice
            | AtlOn | SlIf { .. } | SlBlock => String::new(),
            Valued(text) | Snippet(text) => text.clone(),
            Part { keyword: PartKeyword::Else, .. } => "else:".to_owned(),
            Part { keyword, condition } => match condition {
                Some(c) => format!("{} {c}:", keyword.as_str()),
                None => format!("{}:", keyword.as_str()),
            },

            Label { name, parameters, hide } => {
                let mut s = format!("label {name}{}", parameters.as_deref().unwrap_or(""));
                if *hide {
                    s.push_str(" hide");
                }
                s + ":"
            }
            Init { priority: 0 } => "init:".to_owned(),
            Init { priority } => format!("init {priority}:"),
            Python { early, hide, store } => {
                let mut s = String::from("python");
                if *early {
                    s.push_str(" early");
                }
                if *hide {
                    s.push_str(" hide");
                }
                if let Some(store) = store {
                    let _ = write!(s, " in {store}");
                }
                s + ":"
            }
            Say { who, attributes, temporary, what, arguments, interact, with } => {
                let mut s = String::new();
                if let Some(who) = who {
                    s.push_str(who);
                    s.push(' ');
                }
                for a in attributes {
                    s.push_str(a);
                    s.push(' ');
                }
                if !temporary.is_empty() {
                    let _ = write!(s, "@ {} ", temporary.join(" "));
                }
                s.push_str(&quote(what));
                if let Some(args) = arguments {
                    let _ = write!(s, " {args}");
                }
                if !interact {
                    s.push_str(" nointeract");
                }
                if let Some(w) = with {
                    let _ = write!(s, " with {w}");
                }
                s
            }
            Show { imspec, atl } => with_colon(format!("show {imspec}"), *atl),
            ShowLayer { layer, at_list, atl } => {
                let mut s = format!("show layer {layer}");
                if !at_list.is_empty() {
                    let _ = write!(s, " at {}", at_list.join(", "));
                }
                with_colon(s, *atl)
            }
            Camera { layer, at_list, atl } => {
                let mut s = String::from("camera");
                if let Some(layer) = layer {
                    let _ = write!(s, " {layer}");
                }
                if !at_list.is_empty() {
                    let _ = write!(s, " at {}", at_list.join(", "));
                }
                with_colon(s, *atl)
            }
            Scene { imspec, layer, atl } => {
                let mut s = String::from("scene");
                if let Some(spec) = imspec {
                    let _ = write!(s, " {spec}");
                }
                if let Some(layer) = layer.as_ref().filter(|l| *l != "master") {
                    let _ = write!(s, " onlayer {layer}");
                }
                with_colon(s, *atl)
            }
            Hide { imspec } => format!("hide {imspec}"),
            With { expr } => format!("with {expr}"),
            Call { target, expression: true, arguments: Some(args) } => format!("call expression {target} pass {args}"),
            Call { target, expression, arguments } => format!(
                "call {}{target}{}",
                if *expression { "expression " } else { "" },
                arguments.as_deref().unwrap_or("")
            ),
            Return { expr: Some(e) } => format!("return {e}"),
            Return { expr: None } => "return".to_owned(),
            Jump { target, expression } => format!("jump {}{target}", if *expression { "expression " } else { "" }),
            Pass | SlPass => "pass".to_owned(),
            While { condition } => format!("while {condition}:"),
            Menu { arguments } => format!("menu{}:", arguments.as_deref().unwrap_or("")),
            MenuItem { label, arguments, condition, caption } => {
                let mut s = quote(label);
                if let Some(args) = arguments {
                    let _ = write!(s, " {args}");
                }
                if let Some(c) = condition {
                    let _ = write!(s, " if {c}");
                }
                with_colon(s, !caption)
            }
            UserStatement { line } => line.clone(),
            Define { store, name, index, operator, expr } => {
                let index = index.as_ref().map(|i| format!("[{i}]")).unwrap_or_default();
                format!("define {}{name}{index} {operator} {expr}", store_prefix(store.as_ref()))
            }
            Default { store, name, expr } => format!("default {}{name} = {expr}", store_prefix(store.as_ref())),
            Image { name, expr: Some(e) } => format!("image {name} = {e}"),
            Image { name, expr: None } => format!("image {name}:"),
            Transform { name, parameters } => format!("transform {name}{}:", parameters.as_deref().unwrap_or("")),
            Style { name, parent, clear, take, variant, block } => {
                let mut s = format!("style {name}");
                if let Some(p) = parent {
                    let _ = write!(s, " is {p}");
                }
                if *clear {
                    s.push_str(" clear");
                }
                if let Some(t) = take {
                    let _ = write!(s, " take {t}");
                }
                if let Some(v) = variant {
                    let _ = write!(s, " variant {v}");
                }
                with_colon(s, *block)
            }
            Translate { language, identifier } => {
                format!("translate {} {identifier}:", language.as_deref().unwrap_or("None"))
            }
            TranslateString { language } => format!("translate {language} strings:"),
            TranslatePython { language } => format!("translate {language} python:"),
            TranslateBlock { language, inner } => format!("translate {language} {inner}"),
            Rpy { rest } => format!("rpy {}", rest.join(" ")),

            AtlBlock => "block:".to_owned(),
            AtlMultipurpose { line, block } => with_colon(line.clone(), *block),
            AtlContainsExpr { expr } => format!("contains {expr}"),
            AtlRepeat { count: Some(n) } => format!("repeat {n}"),
            AtlRepeat { count: None } => "repeat".to_owned(),
            AtlTime { time } => format!("time {time}"),
            AtlEvent { name } => format!("event {name}"),
            AtlFunction { expr } => format!("function {expr}"),

            SlScreen { name, parameters } => format!("screen {name}{}:", parameters.as_deref().unwrap_or("")),
            SlDisplayable { keyword, positional, variable, keywords, block } => {
                let mut s = keyword.clone();
                for p in positional {
                    let _ = write!(s, " {p}");
                }
                if let Some(v) = variable {
                    let _ = write!(s, " as {v}");
                }
                for (k, v) in keywords {
                    let _ = write!(s, " {k} {v}");
                }
                with_colon(s, *block)
            }
            SlFor { variable, index, expr } => match index {
                Some(i) => format!("for {variable} index {i} in {expr}:"),
                None => format!("for {variable} in {expr}:"),
            },
            SlPython => "python:".to_owned(),
            SlDefault { variable, expr } => format!("default {variable} = {expr}"),
            SlUse { target, expression: true, arguments: Some(args), .. } => format!("use expression {target} pass {args}"),
            SlUse { target, expression, arguments, id, block } => {
                let mut s = format!(
                    "use {}{target}{}",
                    if *expression { "expression " } else { "" },
                    arguments.as_deref().unwrap_or("")
                );
                if let Some(id) = id {
                    let _ = write!(s, " id {id}");
                }
                with_colon(s, *block)
            }
            SlTransclude => "transclude".to_owned(),
            SlCustomUse { target, positional, block } => {
                let mut s = target.clone();
                for p in positional {
                    let _ = write!(s, " {p}");
                }
                with_colon(s, *block)
            }
        }
    }

    /// Short name used in diagnostics and logs.
    pub fn name(&self) -> &'static str {
        use NodeKind::*;
        match self {
            Root => "root",
            EmptyLine => "empty-line",
            Valued(_) => "valued",
            Snippet(_) => "snippet",
            Part { .. } => "part",
            Label { .. } => "label",
            Init { .. } => "init",
            Python { .. } => "python",
            Say { .. } => "say",
            Show { .. } => "show",
            ShowLayer { .. } => "show-layer",
            Camera { .. } => "camera",
            Scene { .. } => "scene",
            Hide { .. } => "hide",
            With { .. } => "with",
            Call { .. } => "call",
            Return { .. } => "return",
            Jump { .. } => "jump",
            Pass => "pass",
            While { .. } => "while",
            If => "if",
            Menu { .. } => "menu",
            MenuItem { .. } => "menu-item",
            UserStatement { .. } => "user-statement",
            PostUserStatement => "post-user-statement",
            Define { .. } => "define",
            Default { .. } => "default",
            Image { .. } => "image",
            Transform { .. } => "transform",
            Style { .. } => "style",
            Screen => "screen",
            Translate { .. } => "translate",
            EndTranslate => "end-translate",
            TranslateString { .. } => "translate-string",
            TranslatePython { .. } => "translate-python",
            TranslateBlock { .. } => "translate-block",
            Rpy { .. } => "rpy",
            AtlBlock => "atl-block",
            AtlMultipurpose { .. } => "atl-multipurpose",
            AtlContainsExpr { .. } => "atl-contains",
            AtlChild => "atl-child",
            AtlRepeat { .. } => "atl-repeat",
            AtlParallel => "atl-parallel",
            AtlChoice => "atl-choice",
            AtlTime { .. } => "atl-time",
            AtlOn => "atl-on",
            AtlEvent { .. } => "atl-event",
            AtlFunction { .. } => "atl-function",
            SlScreen { .. } => "sl-screen",
            SlDisplayable { .. } => "sl-displayable",
            SlIf { .. } => "sl-if",
            SlBlock => "sl-block",
            SlFor { .. } => "sl-for",
            SlPython => "sl-python",
            SlPass => "sl-pass",
            SlDefault { .. } => "sl-default",
            SlUse { .. } => "sl-use",
            SlTransclude => "sl-transclude",
            SlCustomUse { .. } => "sl-custom-use",
        }
    }
}
