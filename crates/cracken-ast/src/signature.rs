//! Shared renderers: parameter lists, argument lists, image specifiers and
//! string literals.

use cracken_core::pickle::Value;

use crate::fields::{entries, fields_of, seq, text_of, texts, Fields};

/// Parameter kinds of the `Signature` layout.
const POSITIONAL_ONLY: i64 = 0;
const VAR_POSITIONAL: i64 = 2;
const KEYWORD_ONLY: i64 = 3;
const VAR_KEYWORD: i64 = 4;

/// Renders a `ParameterInfo` or `Signature` object as `(a, b=1, *args)`.
///
/// Returns `None` for a missing or empty parameter list so callers can omit
/// the parentheses entirely.
pub fn parameters(value: Option<&Value>) -> Option<String> {
    let f = fields_of(value?)?;
    let parts = if f.get("positional").is_some() || f.get("extrapos").is_some() || f.get("extrakw").is_some() {
        old_parameters(&f)
    } else {
        new_parameters(&f)
    };
    if parts.is_empty() {
        None
    } else {
        Some(format!("({})", parts.join(", ")))
    }
}

/// `ParameterInfo`: `[(name, default)]` plus `extrapos` / `extrakw`.
fn old_parameters(f: &Fields) -> Vec<String> {
    let mut out: Vec<String> = f
        .list("parameters")
        .iter()
        .filter_map(|p| {
            let pair = seq(p);
            let name = pair.first().and_then(text_of)?;
            Some(match pair.get(1).and_then(text_of) {
                Some(default) => format!("{name}={default}"),
                None => name,
            })
        })
        .collect();
    if let Some(extra) = f.opt_str("extrapos") {
        out.push(format!("*{extra}"));
    }
    if let Some(extra) = f.opt_str("extrakw") {
        out.push(format!("**{extra}"));
    }
    out
}

/// `Signature`: `{name: Parameter(name, kind, default)}`, rendered with the
/// `/` and bare `*` separators.
fn new_parameters(f: &Fields) -> Vec<String> {
    let params: Vec<Value> = match f.get("parameters") {
        Some(v @ Value::Dict(_)) => entries(v).into_iter().map(|(_, p)| p).collect(),
        Some(v) => seq(v),
        None => Vec::new(),
    };

    let mut out = Vec::with_capacity(params.len() + 2);
    let mut pending_slash = false;
    let mut need_star = true;
    for p in &params {
        let Some(pf) = fields_of(p) else { continue };
        let Some(name) = pf.opt_str("name") else { continue };
        let kind = pf.int_or("kind", 1);

        if kind == POSITIONAL_ONLY {
            pending_slash = true;
        } else if pending_slash {
            out.push("/".to_owned());
            pending_slash = false;
        }
        if kind == VAR_POSITIONAL {
            need_star = false;
        } else if kind == KEYWORD_ONLY && need_star {
            out.push("*".to_owned());
            need_star = false;
        }

        out.push(match (kind, pf.opt_str("default")) {
            (VAR_POSITIONAL, _) => format!("*{name}"),
            (VAR_KEYWORD, _) => format!("**{name}"),
            (_, Some(default)) => format!("{name}={default}"),
            (_, None) => name,
        });
    }
    if pending_slash {
        out.push("/".to_owned());
    }
    out
}

/// Renders an `ArgumentInfo` as `(a, k=v, *rest)`; `None` when absent.
pub fn arguments(value: Option<&Value>) -> Option<String> {
    let f = fields_of(value?)?;
    let starred = index_set(f.get("starred_indexes"));
    let doublestarred = index_set(f.get("doublestarred_indexes"));

    let mut out: Vec<String> = f
        .list("arguments")
        .iter()
        .enumerate()
        .filter_map(|(i, arg)| {
            let pair = seq(arg);
            let expr = pair.get(1).and_then(text_of)?;
            let i = i as i64;
            Some(if starred.contains(&i) {
                format!("*{expr}")
            } else if doublestarred.contains(&i) {
                format!("**{expr}")
            } else if let Some(name) = pair.first().and_then(text_of) {
                format!("{name}={expr}")
            } else {
                expr
            })
        })
        .collect();
    if let Some(extra) = f.opt_str("extrapos") {
        out.push(format!("*{extra}"));
    }
    if let Some(extra) = f.opt_str("extrakw") {
        out.push(format!("**{extra}"));
    }
    Some(format!("({})", out.join(", ")))
}

fn index_set(value: Option<&Value>) -> Vec<i64> { value.map(seq).unwrap_or_default().iter().filter_map(Value::as_int).collect() }

/// Decoded image specifier.
///
/// Three layouts exist: `(name, at_list, layer)`,
/// `(name, expression, tag, at_list, layer, zorder)` and the same plus `behind`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSpec {
    /// Name components.
    pub name: Vec<String>,
    /// `expression` form.
    pub expression: Option<String>,
    /// `as` tag.
    pub tag: Option<String>,
    /// `at` transforms.
    pub at_list: Vec<String>,
    /// `onlayer`.
    pub layer: Option<String>,
    /// `zorder`.
    pub zorder: Option<String>,
    /// `behind` tags.
    pub behind: Vec<String>,
}

impl ImageSpec {
    /// Parses any of the tuple layouts. Anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let t = seq(value);
        let name = t.first().map(texts).unwrap_or_default();
        match t.len() {
            3 => Some(Self { name, at_list: texts(&t[1]), layer: text_of(&t[2]), ..Self::default() }),
            6 | 7 => Some(Self {
                name,
                expression: text_of(&t[1]),
                tag: text_of(&t[2]),
                at_list: texts(&t[3]),
                layer: text_of(&t[4]),
                zorder: text_of(&t[5]),
                behind: t.get(6).map(texts).unwrap_or_default(),
            }),
            _ => None,
        }
    }

    /// `expression E`/name, then ` as`, ` at`, ` onlayer`, ` zorder`, ` behind`.
    pub fn render(&self, with_layer: bool) -> String {
        let mut s = match &self.expression {
            Some(e) => format!("expression {e}"),
            None => self.name.join(" "),
        };
        if let Some(tag) = &self.tag {
            s.push_str(&format!(" as {tag}"));
        }
        if !self.at_list.is_empty() {
            s.push_str(&format!(" at {}", self.at_list.join(", ")));
        }
        if with_layer {
            if let Some(layer) = &self.layer {
                s.push_str(&format!(" onlayer {layer}"));
            }
        }
        if let Some(z) = &self.zorder {
            s.push_str(&format!(" zorder {z}"));
        }
        if !self.behind.is_empty() {
            s.push_str(&format!(" behind {}", self.behind.join(", ")));
        }
        s
    }
}

/// Double-quoted script string with `\`, `"` and newlines escaped.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use cracken_core::pickle::{loads, AllowList, PickleWriter};
    use pretty_assertions::assert_eq;

    use super::*;

    fn decode(w: PickleWriter) -> Value {
        loads(&w.finish(), &AllowList::script()).unwrap_or_else(|e| panic!("decode failed: {e}"))
    }

    fn parameter(w: &mut PickleWriter, name: &str, kind: i64, default: Option<&str>) {
        w.object("renpy.parameter", "Parameter", |w| {
            w.str("name").str(name).str("kind").int(kind).str("default");
            match default {
                Some(d) => w.str(d),
                None => w.none(),
            };
        });
    }

    #[test]
    fn old_parameter_info() {
        let mut w = PickleWriter::new();
        w.object("renpy.ast", "ParameterInfo", |w| {
            w.str("parameters").list(|w| {
                w.tuple(|w| {
                    w.str("a").none();
                });
                w.tuple(|w| {
                    w.str("b").str("2");
                });
            });
            w.str("positional").list(|w| {
                w.str("a").str("b");
            });
            w.str("extrapos").str("args").str("extrakw").none();
        });
        assert_eq!(parameters(Some(&decode(w))).as_deref(), Some("(a, b=2, *args)"));
    }

    #[test]
    fn signature_separators() {
        let mut w = PickleWriter::new();
        w.object("renpy.parameter", "Signature", |w| {
            w.str("parameters").dict(|w| {
                w.str("a");
                parameter(w, "a", POSITIONAL_ONLY, None);
                w.str("b");
                parameter(w, "b", 1, Some("1"));
                w.str("c");
                parameter(w, "c", KEYWORD_ONLY, None);
                w.str("kw");
                parameter(w, "kw", VAR_KEYWORD, None);
            });
        });
        assert_eq!(parameters(Some(&decode(w))).as_deref(), Some("(a, /, b=1, *, c, **kw)"));
    }

    #[test]
    fn empty_signature_has_no_parens() {
        let mut w = PickleWriter::new();
        w.object("renpy.parameter", "Signature", |w| {
            w.str("parameters").dict(|_| {});
        });
        assert_eq!(parameters(Some(&decode(w))), None);
        assert_eq!(parameters(None), None);
    }

    #[test]
    fn argument_info_new_layout() {
        let mut w = PickleWriter::new();
        w.object("renpy.parameter", "ArgumentInfo", |w| {
            w.str("arguments").list(|w| {
                w.tuple(|w| {
                    w.none().str("x");
                });
                w.tuple(|w| {
                    w.none().str("rest");
                });
                w.tuple(|w| {
                    w.str("k").str("1");
                });
            });
            w.str("starred_indexes").global("builtins", "set").list(|w| {
                w.int(1);
            });
            w.tuple1().reduce();
            w.str("doublestarred_indexes").global("builtins", "set").list(|_| {}).tuple1().reduce();
        });
        assert_eq!(arguments(Some(&decode(w))).as_deref(), Some("(x, *rest, k=1)"));
    }

    #[test]
    fn image_spec_layouts() {
        let mut w = PickleWriter::new();
        w.tuple(|w| {
            w.tuple(|w| {
                w.str("eileen").str("happy");
            });
            w.none().str("e").list(|w| {
                w.str("left");
            });
            w.str("master").none().list(|w| {
                w.str("bg");
            });
        });
        let spec = ImageSpec::from_value(&decode(w)).unwrap_or_default();
        assert_eq!(spec.render(false), "eileen happy as e at left behind bg");
        assert_eq!(spec.render(true), "eileen happy as e at left onlayer master behind bg");
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("say \"hi\"\\\nnow"), "\"say \\\"hi\\\"\\\\\\nnow\"");
    }
}
