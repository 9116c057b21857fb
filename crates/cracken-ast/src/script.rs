//! Builders for `renpy.ast` statements.

use cracken_core::pickle::Value;

use crate::{
    atl,
    fields::{seq, text_of, texts, Fields},
    reconstruct::{Diagnostic, Reconstructor, MAX_DEPTH},
    registry::Registry,
    signature::{self, quote, ImageSpec},
    Node, NodeKind, PartKeyword,
};

pub(crate) fn register(r: &mut Registry) {
    r.register_all(
        "renpy.ast",
        &[
            ("Label", label),
            ("Init", init),
            ("Python", python),
            ("EarlyPython", python),
            ("Say", say),
            ("Show", show),
            ("ShowLayer", show_layer),
            ("Camera", camera),
            ("Scene", scene),
            ("Hide", hide),
            ("With", with),
            ("Call", call),
            ("Return", ret),
            ("Jump", jump),
            ("Pass", pass),
            ("While", while_loop),
            ("If", if_chain),
            ("Menu", menu),
            ("UserStatement", user_statement),
            ("PostUserStatement", post_user_statement),
            ("Define", define),
            ("Default", default),
            ("Image", image),
            ("Transform", transform),
            ("Style", style),
            ("Screen", screen),
            ("Translate", translate),
            ("EndTranslate", end_translate),
            ("TranslateString", translate_string),
            ("TranslatePython", translate_python),
            ("TranslateBlock", translate_block),
            ("TranslateEarlyBlock", translate_block),
            ("RPY", rpy),
        ],
    );
}

/* ───── helpers ───── */

/// `store.x` → `Some("x")`, the default `store` → `None`.
fn store_suffix(f: &Fields) -> Option<String> { f.str_or("store", "store").strip_prefix("store.").map(str::to_owned) }

fn snippet(f: &Fields, key: &str) -> Node { Node::new(NodeKind::Snippet(f.str_or(key, ""))) }

fn imspec(f: &Fields, rc: &mut Reconstructor<'_>, with_layer: bool) -> Option<String> {
    let value = f.get("imspec").filter(|v| !v.is_none())?;
    match ImageSpec::from_value(value) {
        Some(spec) => Some(spec.render(with_layer)),
        None => {
            rc.diagnose(Diagnostic::BadField {
                class: f.class().qualified(),
                field: "imspec".into(),
                reason: format!("has {} elements", seq(value).len()),
            });
            None
        }
    }
}

fn atl_children(f: &Fields, rc: &mut Reconstructor<'_>) -> (bool, Vec<Node>) {
    if f.has("atl") {
        (true, atl::body(f.get("atl"), rc))
    } else {
        (false, Vec::new())
    }
}

/// Arms of an `if`-like switch; `body` builds one arm's children.
pub(crate) fn switch_parts(
    entries: &[Value],
    first: PartKeyword,
    rc: &mut Reconstructor<'_>,
    mut body: impl FnMut(&mut Reconstructor<'_>, Option<&Value>) -> Vec<Node>,
) -> Vec<Node> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let pair = seq(entry);
            let condition = pair.first().and_then(text_of);
            let keyword = match (i, condition.as_deref()) {
                (0, _) => first,
                (_, None | Some("True")) => PartKeyword::Else,
                _ => PartKeyword::Elif,
            };
            let condition = (keyword != PartKeyword::Else).then_some(condition).flatten();
            Node::new(NodeKind::Part { keyword, condition }).with_children(body(&mut *rc, pair.get(1)))
        })
        .collect()
}

/* ───── statements ───── */

fn label(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let mut body = rc.nodes(f.get("block"));
    body.push(Node::empty_line());
    Node::new(NodeKind::Label {
        name: f.str_or("name", ""),
        parameters: signature::parameters(f.get("parameters")),
        hide: f.bool_or("hide", false),
    })
    .with_children(body)
}

fn init(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let mut body = rc.nodes(f.get("block"));
    body.push(Node::empty_line());
    Node::new(NodeKind::Init { priority: f.int_or("priority", 0) }).with_children(body)
}

fn python(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::Python {
        early: f.class().name == "EarlyPython",
        hide: f.bool_or("hide", false),
        store: store_suffix(f),
    })
    .with_children(vec![snippet(f, "code")])
}

fn say(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::Say {
        who: f.opt_str("who"),
        attributes: f.get("attributes").map(texts).unwrap_or_default(),
        temporary: f.get("temporary_attributes").map(texts).unwrap_or_default(),
        what: f.str_or("what", ""),
        arguments: signature::arguments(f.get("arguments")),
        interact: f.bool_or("interact", true),
        with: f.opt_str("with_"),
    })
}

fn show(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let imspec = imspec(f, rc, true).unwrap_or_default();
    let (atl, body) = atl_children(f, rc);
    Node::new(NodeKind::Show { imspec, atl }).with_children(body)
}

fn show_layer(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let (atl, body) = atl_children(f, rc);
    Node::new(NodeKind::ShowLayer { layer: f.str_or("layer", "master"), at_list: f.get("at_list").map(texts).unwrap_or_default(), atl })
        .with_children(body)
}

fn camera(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let (atl, body) = atl_children(f, rc);
    Node::new(NodeKind::Camera { layer: f.opt_str("layer").filter(|l| !l.is_empty()), at_list: f.get("at_list").map(texts).unwrap_or_default(), atl })
        .with_children(body)
}

fn scene(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let imspec = imspec(f, rc, false);
    let (atl, body) = atl_children(f, rc);
    Node::new(NodeKind::Scene { imspec, layer: f.opt_str("layer"), atl }).with_children(body)
}

fn hide(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::Hide { imspec: imspec(f, rc, true).unwrap_or_default() })
}

fn with(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    let expr = f.opt_str("expr").filter(|e| e != "None");
    match expr {
        None if f.has("paired") => Node::excluded(NodeKind::With { expr: "None".into() }),
        expr => Node::new(NodeKind::With { expr: expr.unwrap_or_else(|| "None".into()) }),
    }
}

fn call(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::Call {
        target: f.str_or("label", ""),
        expression: f.bool_or("expression", false),
        arguments: signature::arguments(f.get("arguments")),
    })
}

fn ret(f: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::Return { expr: f.opt_str("expression") }) }

fn jump(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::Jump { target: f.str_or("target", ""), expression: f.bool_or("expression", false) })
}

fn pass(_: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::Pass) }

fn while_loop(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::While { condition: f.str_or("condition", "True") }).with_children(rc.nodes(f.get("block")))
}

fn if_chain(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let parts = switch_parts(&f.list("entries"), PartKeyword::If, rc, |rc, block| rc.nodes(block));
    Node::excluded(NodeKind::If).with_children(parts)
}

fn menu(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let mut children = Vec::new();
    if let Some(set) = f.opt_str("set").filter(|s| s != "None") {
        children.push(Node::valued(format!("set {set}")));
    }

    let item_arguments = f.list("item_arguments");
    for (i, item) in f.list("items").iter().enumerate() {
        let t = seq(item);
        let label = t.first().and_then(text_of).unwrap_or_default();
        let condition = t.get(1).and_then(text_of).filter(|c| c != "True");
        let block = t.get(2).filter(|b| !b.is_none());
        let node = Node::new(NodeKind::MenuItem {
            label,
            arguments: signature::arguments(item_arguments.get(i).filter(|a| !a.is_none())),
            condition,
            caption: block.is_none(),
        });
        children.push(match block {
            Some(block) => node.with_children(rc.nodes(Some(block))),
            None => node,
        });
    }

    Node::new(NodeKind::Menu { arguments: signature::arguments(f.get("arguments").filter(|a| !a.is_none())) })
        .with_children(children)
}

/// Nested `(file, line, text, sub-block)` lexer tuples of a user statement.
fn lexer_lines(block: &Value, depth: usize) -> Vec<Node> {
    if depth >= MAX_DEPTH {
        return Vec::new();
    }
    seq(block)
        .iter()
        .filter_map(|entry| {
            let t = seq(entry);
            let text = t.get(2).and_then(text_of)?;
            let sub = t.get(3).map(|b| lexer_lines(b, depth + 1)).unwrap_or_default();
            Some(Node::valued(text).with_children(sub))
        })
        .collect()
}

fn user_statement(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    let children = f.get("block").map(|b| lexer_lines(b, 0)).unwrap_or_default();
    Node::new(NodeKind::UserStatement { line: f.str_or("line", "") }).with_children(children)
}

fn post_user_statement(_: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::excluded(NodeKind::PostUserStatement) }

fn define(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::Define {
        store: store_suffix(f),
        name: f.str_or("varname", ""),
        index: f.opt_str("index"),
        operator: f.str_or("operator", "="),
        expr: f.str_or("code", "None"),
    })
}

fn default(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::Default { store: store_suffix(f), name: f.str_or("varname", ""), expr: f.str_or("code", "None") })
}

fn image(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let name = f.get("imgname").map(texts).unwrap_or_default().join(" ");
    let (atl, body) = atl_children(f, rc);
    if atl {
        Node::new(NodeKind::Image { name, expr: None }).with_children(body)
    } else {
        Node::new(NodeKind::Image { name, expr: Some(f.str_or("code", "None")) })
    }
}

fn transform(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let (_, body) = atl_children(f, rc);
    Node::new(NodeKind::Transform { name: f.str_or("varname", ""), parameters: signature::parameters(f.get("parameters")) })
        .with_children(body)
}

fn style(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    let mut children: Vec<Node> = f.list("delattr").iter().filter_map(text_of).map(|p| Node::valued(format!("del {p}"))).collect();
    children.extend(f.entries("properties").iter().filter_map(|(k, v)| {
        let (k, v) = (text_of(k)?, text_of(v)?);
        Some(Node::valued(format!("{k} {v}")))
    }));
    Node::new(NodeKind::Style {
        name: f.str_or("style_name", ""),
        parent: f.opt_str("parent"),
        clear: f.bool_or("clear", false),
        take: f.opt_str("take"),
        variant: f.opt_str("variant"),
        block: !children.is_empty(),
    })
    .with_children(children)
}

fn screen(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let inner = f.get("screen").and_then(|s| rc.node(s));
    Node::excluded(NodeKind::Screen).with_children(inner.into_iter().collect())
}

fn translate(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let language = f.opt_str("language");
    let kind = NodeKind::Translate { language: language.clone(), identifier: f.str_or("identifier", "") };
    let body = rc.nodes(f.get("block"));
    match language {
        Some(_) => Node::new(kind).with_children(body),
        None => Node::excluded(kind).with_children(body),
    }
}

fn end_translate(_: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::excluded(NodeKind::EndTranslate) }

fn translate_string(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::TranslateString { language: f.str_or("language", "None") }).with_children(vec![
        Node::valued(format!("old {}", quote(&f.str_or("old", "")))),
        Node::valued(format!("new {}", quote(&f.str_or("new", "")))),
    ])
}

fn translate_python(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::TranslatePython { language: f.str_or("language", "None") }).with_children(vec![snippet(f, "code")])
}

fn translate_block(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let language = f.str_or("language", "None");
    let mut body = rc.nodes(f.get("block"));
    if body.len() == 1 {
        let mut inner = body.remove(0);
        let header = inner.render();
        Node::new(NodeKind::TranslateBlock { language, inner: header }).with_children(inner.take_children())
    } else {
        Node::excluded(NodeKind::TranslateBlock { language, inner: String::new() }).with_children(body)
    }
}

fn rpy(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    let rest = match f.get("rest") {
        Some(v @ Value::Str(_)) => text_of(v).into_iter().collect(),
        Some(v) => texts(v),
        None => Vec::new(),
    };
    Node::new(NodeKind::Rpy { rest })
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use cracken_core::pickle::{loads, AllowList, PickleWriter};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{reconstruct, Registry, Visit};

    /// Builds `(None, [statements])`, reconstructs it and returns
    /// indented header lines (excluded nodes shown in brackets).
    fn lines(body: impl FnOnce(&mut PickleWriter)) -> Vec<String> {
        let mut w = PickleWriter::new();
        w.tuple(|w| {
            w.none().list(body);
        });
        let value = loads(&w.finish(), &AllowList::script()).unwrap_or_else(|e| panic!("{e}"));
        let (tree, diags) = reconstruct(&value, &Registry::standard()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(diags, vec![]);
        let mut depth = 0;
        let mut out = Vec::new();
        for v in tree.walk() {
            match v {
                Visit::Node(n) => {
                    let text = if n.exclude { format!("[{}]", n.kind.name()) } else { n.render() };
                    out.push(format!("{}{text}", "  ".repeat(depth)));
                    depth += 1;
                }
                Visit::BlockEnd => depth -= 1,
            }
        }
        out
    }

    fn pyexpr(w: &mut PickleWriter, text: &str) {
        w.call("renpy.ast", "PyExpr", |w| {
            w.str(text).str("game/script.rpy").int(1);
        });
    }

    fn pycode(w: &mut PickleWriter, source: &str) {
        w.global("renpy.ast", "PyCode").op(cracken_core::pickle::op::EMPTY_TUPLE).newobj();
        w.tuple(|w| {
            w.int(1).str(source).tuple(|w| {
                w.str("game/script.rpy").int(1);
            });
            w.str("exec");
        })
        .build();
    }

    #[test]
    fn label_with_block() {
        let out = lines(|w| {
            w.object("renpy.ast", "Label", |w| {
                w.str("name").str("test").str("parameters").none();
                w.str("block").list(|w| {
                    w.object("renpy.ast", "Pass", |_| {});
                });
            });
        });
        assert_eq!(out, ["label test:", "  pass", "  ", ""]);
    }

    #[test]
    fn if_parts() {
        let out = lines(|w| {
            w.object("renpy.ast", "If", |w| {
                w.str("entries").list(|w| {
                    w.tuple(|w| {
                        pyexpr(w, "x==1");
                        w.list(|w| {
                            w.object("renpy.ast", "Pass", |_| {});
                        });
                    });
                    w.tuple(|w| {
                        pyexpr(w, "y");
                        w.list(|_| {});
                    });
                    w.tuple(|w| {
                        w.str("True").list(|_| {});
                    });
                });
            });
        });
        assert_eq!(out, ["[if]", "  if x==1:", "    pass", "  elif y:", "  else:", ""]);
    }

    #[test]
    fn python_and_define() {
        let out = lines(|w| {
            w.object("renpy.ast", "EarlyPython", |w| {
                w.str("hide").bool(true).str("store").str("store.mine").str("code");
                pycode(w, "x = 1\n");
            });
            w.object("renpy.ast", "Define", |w| {
                w.str("store").str("store").str("varname").str("e").str("operator").str("=").str("index").none();
                w.str("code");
                pycode(w, "Character('Eileen')");
            });
            w.object("renpy.ast", "Default", |w| {
                w.str("store").str("store.persistent").str("varname").str("seen").str("code");
                pycode(w, "False");
            });
        });
        assert_eq!(
            out,
            [
                "python early hide in mine:",
                "  x = 1\n",
                "define e = Character('Eileen')",
                "default persistent.seen = False",
                "",
            ]
        );
    }

    #[test]
    fn menu_items() {
        let out = lines(|w| {
            w.object("renpy.ast", "Menu", |w| {
                w.str("set").none();
                w.str("items").list(|w| {
                    w.tuple(|w| {
                        w.str("Where?").none().none();
                    });
                    w.tuple(|w| {
                        w.str("Left").str("True").list(|w| {
                            w.object("renpy.ast", "Pass", |_| {});
                        });
                    });
                    w.tuple(|w| {
                        w.str("Right").str("has_key").list(|_| {});
                    });
                });
            });
        });
        assert_eq!(out, ["menu:", "  \"Where?\"", "  \"Left\":", "    pass", "  \"Right\" if has_key:", ""]);
    }

    #[test]
    fn show_scene_and_paired_with() {
        let out = lines(|w| {
            w.object("renpy.ast", "Scene", |w| {
                w.str("imspec").tuple(|w| {
                    w.tuple(|w| {
                        w.str("bg").str("room");
                    });
                    w.list(|_| {});
                    w.str("master");
                });
                w.str("layer").str("master").str("atl").none();
            });
            w.object("renpy.ast", "With", |w| {
                w.str("expr").str("None").str("paired").str("dissolve");
            });
            w.object("renpy.ast", "Show", |w| {
                w.str("imspec").tuple(|w| {
                    w.tuple(|w| {
                        w.str("eileen");
                    });
                    w.none().none().list(|w| {
                        w.str("left");
                    });
                    w.str("master").none();
                });
            });
            w.object("renpy.ast", "With", |w| {
                w.str("expr").str("dissolve").str("paired").none();
            });
        });
        assert_eq!(out, ["scene bg room", "[with]", "show eileen at left onlayer master", "with dissolve", ""]);
    }

    #[test]
    fn translate_family() {
        let out = lines(|w| {
            w.object("renpy.ast", "TranslateString", |w| {
                w.str("language").str("french").str("old").str("Hi").str("new").str("Salut");
            });
            w.object("renpy.ast", "TranslateBlock", |w| {
                w.str("language").str("french").str("block").list(|w| {
                    w.object("renpy.ast", "Style", |w| {
                        w.str("style_name").str("default").str("parent").none();
                        w.str("properties").dict(|w| {
                            w.str("font").str("'fr.ttf'");
                        });
                    });
                });
            });
            w.object("renpy.ast", "Translate", |w| {
                w.str("language").none().str("identifier").str("start_1234").str("block").list(|w| {
                    w.object("renpy.ast", "Pass", |_| {});
                });
            });
            w.object("renpy.ast", "EndTranslate", |_| {});
        });
        assert_eq!(
            out,
            [
                "translate french strings:",
                "  old \"Hi\"",
                "  new \"Salut\"",
                "translate french style default:",
                "  font 'fr.ttf'",
                "[translate]",
                "  pass",
                "[end-translate]",
                "",
            ]
        );
    }

    #[test]
    fn user_statement_sub_blocks() {
        let out = lines(|w| {
            w.object("renpy.ast", "UserStatement", |w| {
                w.str("line").str("chapter 1:");
                w.str("block").list(|w| {
                    w.tuple(|w| {
                        w.str("a.rpy").int(2).str("title \"One\"").list(|w| {
                            w.tuple(|w| {
                                w.str("a.rpy").int(3).str("sub").list(|_| {});
                            });
                        });
                    });
                });
            });
            w.object("renpy.ast", "RPY", |w| {
                w.str("rest").tuple(|w| {
                    w.str("python").str("3");
                });
            });
        });
        assert_eq!(out, ["chapter 1:", "  title \"One\"", "    sub", "rpy python 3", ""]);
    }
}
