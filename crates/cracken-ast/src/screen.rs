//! Builders for screen-language (`renpy.sl2.slast`) statements.

use cracken_core::pickle::{ClassTag, Value};

use crate::{
    fields::{fields_of, seq, text_of, texts, Fields},
    reconstruct::Reconstructor,
    registry::Registry,
    script::switch_parts,
    signature, Node, NodeKind, PartKeyword,
};

pub(crate) fn register(r: &mut Registry) {
    r.register_all(
        "renpy.sl2.slast",
        &[
            ("SLScreen", sl_screen),
            ("SLDisplayable", displayable),
            ("SLBlock", sl_block),
            ("SLIf", sl_if),
            ("SLShowIf", sl_if),
            ("SLFor", sl_for),
            ("SLPython", sl_python),
            ("SLPass", sl_pass),
            ("SLDefault", sl_default),
            ("SLUse", sl_use),
            ("SLTransclude", sl_transclude),
            ("SLCustomUse", sl_custom_use),
        ],
    );
}

/// Screen properties printed only when they differ from these defaults.
const SCREEN_PROPERTIES: &[(&str, &str)] = &[
    ("modal", "False"),
    ("sensitive", "True"),
    ("tag", "None"),
    ("zorder", "0"),
    ("variant", "None"),
    ("layer", "'screens'"),
    ("predict", "None"),
];

/// `(module, name, style)` → statement keyword. `None` style matches any.
const DISPLAYABLES: &[(&str, &str, Option<&str>, &str)] = &[
    ("renpy.display.layout", "Null", None, "null"),
    ("renpy.text.text", "Text", None, "text"),
    ("renpy.display.layout", "MultiBox", Some("hbox"), "hbox"),
    ("renpy.display.layout", "MultiBox", Some("vbox"), "vbox"),
    ("renpy.display.layout", "MultiBox", Some("fixed"), "fixed"),
    ("renpy.display.layout", "MultiBox", None, "fixed"),
    ("renpy.display.layout", "Grid", None, "grid"),
    ("renpy.display.layout", "Side", None, "side"),
    ("renpy.display.layout", "Window", Some("frame"), "frame"),
    ("renpy.display.layout", "Window", None, "window"),
    ("renpy.sl2.sldisplayables", "sl2add", None, "add"),
    ("renpy.sl2.sldisplayables", "sl2bar", Some("vbar"), "vbar"),
    ("renpy.sl2.sldisplayables", "sl2bar", None, "bar"),
    ("renpy.sl2.sldisplayables", "sl2vbar", None, "vbar"),
    ("renpy.sl2.sldisplayables", "sl2viewport", None, "viewport"),
    ("renpy.sl2.sldisplayables", "sl2vpgrid", None, "vpgrid"),
    ("renpy.display.behavior", "Button", None, "button"),
    ("renpy.display.behavior", "Input", None, "input"),
    ("renpy.display.behavior", "Timer", None, "timer"),
    ("renpy.display.behavior", "MouseArea", None, "mousearea"),
    ("renpy.display.behavior", "OnEvent", None, "on"),
    ("renpy.display.behavior", "DismissBehavior", None, "dismiss"),
    ("renpy.display.behavior", "Keymap", None, "key"),
    ("renpy.ui", "_key", None, "key"),
    ("renpy.ui", "_imagebutton", None, "imagebutton"),
    ("renpy.ui", "_textbutton", None, "textbutton"),
    ("renpy.ui", "_label", None, "label"),
    ("renpy.ui", "_imagemap", None, "imagemap"),
    ("renpy.ui", "_hotspot", None, "hotspot"),
    ("renpy.ui", "_hotbar", None, "hotbar"),
    ("renpy.display.motion", "Transform", None, "transform"),
    ("renpy.display.transform", "Transform", None, "transform"),
    ("renpy.display.dragdrop", "Drag", None, "drag"),
    ("renpy.display.dragdrop", "DragGroup", None, "draggroup"),
];

/// Statement keyword for a displayable class and style; falls back to the
/// style name, then to the lowercased class name.
pub fn displayable_keyword(class: &ClassTag, style: Option<&str>) -> String {
    let style = style.map(|s| s.trim_matches(|c| c == '\'' || c == '"'));
    DISPLAYABLES
        .iter()
        .find(|(m, n, s, _)| class.is(m, n) && s.map_or(true, |s| Some(s) == style))
        .map(|(.., keyword)| (*keyword).to_owned())
        .or_else(|| style.filter(|s| !s.is_empty() && *s != "default").map(str::to_owned))
        .unwrap_or_else(|| class.name.trim_start_matches('_').to_lowercase())
}

/// `key value` lines of an SL block's keyword list.
fn keyword_lines(f: &Fields) -> Vec<Node> {
    keyword_pairs(f).into_iter().map(|(k, v)| Node::valued(format!("{k} {v}"))).collect()
}

fn keyword_pairs(f: &Fields) -> Vec<(String, String)> {
    f.list("keyword")
        .iter()
        .filter_map(|pair| {
            let p = seq(pair);
            Some((text_of(p.first()?)?, p.get(1).and_then(text_of).unwrap_or_else(|| "None".into())))
        })
        .collect()
}

/// Keyword lines then children of an `SLBlock`-shaped value.
fn block_body(block: Option<&Value>, rc: &mut Reconstructor<'_>) -> Vec<Node> {
    let Some(f) = block.and_then(fields_of) else { return Vec::new() };
    let mut out = keyword_lines(&f);
    out.extend(rc.nodes(f.get("children")));
    out
}

fn sl_screen(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let mut children: Vec<Node> = SCREEN_PROPERTIES
        .iter()
        .filter_map(|(key, default)| {
            let value = f.opt_str(key).filter(|v| v != default)?;
            Some(Node::valued(format!("{key} {value}")))
        })
        .collect();
    children.extend(keyword_lines(f));
    if !children.is_empty() {
        children.push(Node::empty_line());
    }
    children.extend(rc.nodes(f.get("children")));
    children.push(Node::empty_line());

    Node::new(NodeKind::SlScreen { name: f.str_or("name", ""), parameters: signature::parameters(f.get("parameters")) })
        .with_children(children)
}

fn displayable(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let class = match f.get("displayable") {
        Some(Value::Class(tag)) => Some(tag.as_ref().clone()),
        Some(other) => other.class().map(|c| c.as_ref().clone()),
        None => None,
    };
    let style = f.opt_str("style");
    let keyword = match &class {
        Some(class) => displayable_keyword(class, style.as_deref()),
        None => style.unwrap_or_else(|| "add".into()),
    };

    let mut children = rc.nodes(f.get("children"));
    let block = !children.is_empty();
    if block {
        children.push(Node::empty_line());
    }
    Node::new(NodeKind::SlDisplayable {
        keyword,
        positional: f.get("positional").map(texts).unwrap_or_default(),
        variable: f.opt_str("variable"),
        keywords: keyword_pairs(f),
        block,
    })
    .with_children(children)
}

fn sl_block(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let mut children = keyword_lines(f);
    children.extend(rc.nodes(f.get("children")));
    Node::excluded(NodeKind::SlBlock).with_children(children)
}

fn sl_if(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let showif = f.class().name == "SLShowIf";
    let first = if showif { PartKeyword::ShowIf } else { PartKeyword::If };
    let mut parts = switch_parts(&f.list("entries"), first, rc, |rc, block| block_body(block, rc));
    parts.push(Node::empty_line());
    Node::excluded(NodeKind::SlIf { showif }).with_children(parts)
}

fn sl_for(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let mut children = keyword_lines(f);
    children.extend(rc.nodes(f.get("children")));
    children.push(Node::empty_line());
    Node::new(NodeKind::SlFor {
        variable: f.str_or("variable", "_"),
        index: f.opt_str("index_expression"),
        expr: f.str_or("expression", "[]"),
    })
    .with_children(children)
}

fn sl_python(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::SlPython).with_children(vec![Node::new(NodeKind::Snippet(f.str_or("code", "")))])
}

fn sl_pass(_: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::SlPass) }

fn sl_default(f: &Fields, _: &mut Reconstructor<'_>) -> Node {
    Node::new(NodeKind::SlDefault { variable: f.str_or("variable", ""), expr: f.str_or("expression", "None") })
}

fn sl_use(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let expression = matches!(f.get("target"), Some(Value::Object(_)));
    let children = block_body(f.get("block").filter(|b| !b.is_none()), rc);
    Node::new(NodeKind::SlUse {
        target: f.str_or("target", ""),
        expression,
        arguments: signature::arguments(f.get("args").filter(|a| !a.is_none())),
        id: f.opt_str("id"),
        block: !children.is_empty(),
    })
    .with_children(children)
}

fn sl_transclude(_: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::SlTransclude) }

fn sl_custom_use(f: &Fields, rc: &mut Reconstructor<'_>) -> Node {
    let children = block_body(f.get("block").filter(|b| !b.is_none()), rc);
    Node::new(NodeKind::SlCustomUse {
        target: f.str_or("target", ""),
        positional: f.get("positional").map(texts).unwrap_or_default(),
        block: !children.is_empty(),
    })
    .with_children(children)
}

#[cfg(test)]
mod tests {
    use cracken_core::pickle::{loads, AllowList, PickleWriter};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{reconstruct, Registry, Visit};

    const SL: &str = "renpy.sl2.slast";

    fn screen_lines(screen: impl FnOnce(&mut PickleWriter)) -> Vec<String> {
        let mut w = PickleWriter::new();
        w.tuple(|w| {
            w.none().list(|w| {
                w.object("renpy.ast", "Screen", |w| {
                    w.str("screen").object(SL, "SLScreen", screen);
                });
            });
        });
        let value = loads(&w.finish(), &AllowList::script()).unwrap_or_else(|e| panic!("{e}"));
        let (tree, diags) = reconstruct(&value, &Registry::standard()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(diags, vec![]);
        // excluded wrappers print nothing and do not indent their children
        let mut open = Vec::new();
        let mut out = Vec::new();
        for v in tree.walk() {
            match v {
                Visit::Node(n) => {
                    if !n.exclude {
                        let depth = open.iter().filter(|printed| **printed).count();
                        out.push(format!("{}{}", "  ".repeat(depth), n.render()).trim_end().to_owned());
                    }
                    open.push(!n.exclude);
                }
                Visit::BlockEnd => {
                    open.pop();
                }
            }
        }
        out
    }

    fn text(w: &mut PickleWriter, what: &str) {
        w.object(SL, "SLDisplayable", |w| {
            w.str("displayable").global("renpy.text.text", "Text");
            w.str("style").str("text");
            w.str("positional").list(|w| {
                w.str(what);
            });
            w.str("keyword").list(|_| {});
            w.str("children").list(|_| {});
        });
    }

    #[test]
    fn keyword_table() {
        let multibox = ClassTag::new("renpy.display.layout", "MultiBox");
        assert_eq!(displayable_keyword(&multibox, Some("vbox")), "vbox");
        assert_eq!(displayable_keyword(&multibox, Some("'hbox'")), "hbox");
        assert_eq!(displayable_keyword(&multibox, Some("menu_box")), "fixed");
        assert_eq!(displayable_keyword(&ClassTag::new("renpy.ui", "_textbutton"), Some("button")), "textbutton");
        assert_eq!(displayable_keyword(&ClassTag::new("mygame", "Gauge"), Some("gauge")), "gauge");
        assert_eq!(displayable_keyword(&ClassTag::new("mygame", "_Gauge"), None), "gauge");
    }

    #[test]
    fn screen_with_properties_and_children() {
        let out = screen_lines(|w| {
            w.str("name").str("hud").str("parameters").none();
            w.str("modal").str("True").str("zorder").str("0").str("tag").none();
            w.str("keyword").list(|w| {
                w.tuple(|w| {
                    w.str("style_prefix").str("'hud'");
                });
            });
            w.str("children").list(|w| {
                w.object(SL, "SLDisplayable", |w| {
                    w.str("displayable").global("renpy.display.layout", "MultiBox");
                    w.str("style").str("vbox").str("positional").list(|_| {});
                    w.str("variable").none();
                    w.str("keyword").list(|w| {
                        w.tuple(|w| {
                            w.str("xalign").str("0.5");
                        });
                    });
                    w.str("children").list(|w| {
                        text(w, "'Score'");
                    });
                });
                w.object(SL, "SLDefault", |w| {
                    w.str("variable").str("n").str("expression").str("0");
                });
            });
        });
        assert_eq!(
            out,
            [
                "screen hud:",
                "  modal True",
                "  style_prefix 'hud'",
                "",
                "  vbox xalign 0.5:",
                "    text 'Score'",
                "",
                "  default n = 0",
                "",
                "",
            ]
        );
    }

    #[test]
    fn showif_and_for() {
        let out = screen_lines(|w| {
            w.str("name").str("s");
            w.str("children").list(|w| {
                w.object(SL, "SLShowIf", |w| {
                    w.str("entries").list(|w| {
                        w.tuple(|w| {
                            w.str("flag");
                            w.object(SL, "SLBlock", |w| {
                                w.str("keyword").list(|_| {});
                                w.str("children").list(|w| {
                                    text(w, "'on'");
                                });
                            });
                        });
                        w.tuple(|w| {
                            w.none();
                            w.object(SL, "SLBlock", |w| {
                                w.str("keyword").list(|_| {});
                                w.str("children").list(|w| {
                                    w.object(SL, "SLPass", |_| {});
                                });
                            });
                        });
                    });
                });
                w.object(SL, "SLFor", |w| {
                    w.str("variable").str("i").str("index_expression").str("i").str("expression").str("range(3)");
                    w.str("keyword").list(|_| {});
                    w.str("children").list(|w| {
                        w.object(SL, "SLUse", |w| {
                            w.str("target").str("cell").str("id").none().str("block").none();
                            w.str("args").object("renpy.ast", "ArgumentInfo", |w| {
                                w.str("arguments").list(|w| {
                                    w.tuple(|w| {
                                        w.none().str("i");
                                    });
                                });
                                w.str("extrapos").none().str("extrakw").none();
                            });
                        });
                    });
                });
            });
        });
        assert_eq!(
            out,
            [
                "screen s:",
                "  showif flag:",
                "    text 'on'",
                "  else:",
                "    pass",
                "",
                "  for i index i in range(3):",
                "    use cell(i)",
                "",
                "",
                "",
            ]
        );
    }
}
