use cracken_ast::{reconstruct, Diagnostic, Node, NodeKind, Registry, MAX_DEPTH};
use cracken_core::pickle::{loads, AllowList, PickleWriter, Value};
use pretty_assertions::assert_eq;

fn decode(w: PickleWriter) -> Value {
    loads(&w.finish(), &AllowList::script()).unwrap_or_else(|e| panic!("decode failed: {e}"))
}

fn build(value: &Value) -> (Node, Vec<Diagnostic>) {
    reconstruct(value, &Registry::standard()).unwrap_or_else(|e| panic!("{e}"))
}

#[test]
fn shared_signature_is_cloned_per_label() {
    let mut w = PickleWriter::new();
    w.tuple(|w| {
        w.none().list(|w| {
            w.object("renpy.ast", "Label", |w| {
                w.str("name").str("a").str("block").list(|_| {});
                w.str("parameters").object("renpy.parameter", "Signature", |w| {
                    w.str("parameters").dict(|_| {});
                });
                w.put(9);
            });
            w.object("renpy.ast", "Label", |w| {
                w.str("name").str("b").str("block").list(|_| {});
                w.str("parameters").get(9);
            });
        });
    });
    let (mut tree, diags) = build(&decode(w));
    assert!(diags.is_empty());

    let headers: Vec<_> = tree.content().map(Node::render).collect();
    assert_eq!(headers, ["label a:", "label b:"]);

    // mutating one copy leaves the other alone
    tree.children_mut()[0].push(Node::new(NodeKind::Pass));
    assert_eq!(tree.children()[0].children().len(), 2);
    assert_eq!(tree.children()[1].children().len(), 1);
}

#[test]
fn hostile_nesting_stops_at_the_depth_limit() {
    fn nest(w: &mut PickleWriter, left: usize) {
        w.object("renpy.ast", "While", |w| {
            w.str("condition").str("True").str("block").list(|w| {
                if left > 0 {
                    nest(w, left - 1);
                }
            });
        });
    }

    let mut w = PickleWriter::new();
    w.tuple(|w| {
        w.none().list(|w| nest(w, MAX_DEPTH + 10));
    });
    let (tree, diags) = build(&decode(w));
    assert_eq!(diags, vec![Diagnostic::TooDeep { class: "renpy.ast.While".into(), limit: MAX_DEPTH }]);
    assert_eq!(tree.size(), MAX_DEPTH + 2);
}

#[test]
fn screen_python_and_image_atl() {
    let mut w = PickleWriter::new();
    w.tuple(|w| {
        w.none().list(|w| {
            w.object("renpy.ast", "Image", |w| {
                w.str("imgname").tuple(|w| {
                    w.str("logo").str("blink");
                });
                w.str("code").none();
                w.str("atl").object("renpy.atl", "RawBlock", |w| {
                    w.str("animation").bool(true).str("statements").list(|w| {
                        w.object("renpy.atl", "RawTime", |w| {
                            w.str("time").str("0.5");
                        });
                    });
                });
            });
        });
    });
    let (tree, diags) = build(&decode(w));
    assert!(diags.is_empty());
    let image = &tree.children()[0];
    assert_eq!(image.render(), "image logo blink:");
    let body: Vec<_> = image.children().iter().map(Node::render).collect();
    assert_eq!(body, ["animation", "time 0.5"]);
}
