//! Typed, defaulting view over an object's restored state.
//!
//! Ren'Py changed its node layouts many times; a field missing from an older
//! (or newer) file is never an error. Every getter takes the default the
//! current Ren'Py constructor would have used.

use std::rc::Rc;

use cracken_core::{
    pickle::{ClassTag, Object, Value},
    Location,
};
use indexmap::IndexMap;

/// Merged attribute map of one object skeleton.
#[derive(Debug, Clone)]
pub struct Fields {
    class: Rc<ClassTag>,
    map: IndexMap<String, Value>,
    args: Vec<Value>,
}

impl Fields {
    /// Collects dict state, `(dict, slots)` state and `PyCode` tuple state.
    pub fn of(obj: &Object) -> Self {
        let mut map = IndexMap::new();
        if let Some(state) = &obj.state {
            merge_state(&mut map, state);
        }
        Self { class: Rc::clone(&obj.class), map, args: obj.args.clone() }
    }

    /// Class of the object.
    pub fn class(&self) -> &ClassTag { &self.class }
    /// Constructor arguments.
    pub fn args(&self) -> &[Value] { &self.args }
    /// Raw attribute.
    pub fn get(&self, name: &str) -> Option<&Value> { self.map.get(name) }
    /// Present and not `None`.
    pub fn has(&self, name: &str) -> bool { self.map.get(name).is_some_and(|v| !v.is_none()) }

    /// Attribute as source text (`PyExpr`, `PyCode`, plain strings and scalars).
    pub fn opt_str(&self, name: &str) -> Option<String> { self.map.get(name).and_then(text_of) }
    /// Attribute as text with a fallback.
    pub fn str_or(&self, name: &str, default: &str) -> String { self.opt_str(name).unwrap_or_else(|| default.to_owned()) }
    /// Attribute truthiness with a fallback for missing fields.
    pub fn bool_or(&self, name: &str, default: bool) -> bool { self.map.get(name).map_or(default, Value::truthy) }
    /// Integer attribute with a fallback.
    pub fn int_or(&self, name: &str, default: i64) -> i64 { self.map.get(name).and_then(Value::as_int).unwrap_or(default) }
    /// Sequence attribute (lists, tuples, sets and their revertable subclasses).
    pub fn list(&self, name: &str) -> Vec<Value> { self.map.get(name).map(seq).unwrap_or_default() }
    /// Mapping attribute (dicts and revertable dicts), insertion ordered.
    pub fn entries(&self, name: &str) -> Vec<(Value, Value)> { self.map.get(name).map(entries).unwrap_or_default() }

    /// Nested object attribute.
    pub fn object(&self, name: &str) -> Option<Value> {
        self.map.get(name).filter(|v| matches!(v, Value::Object(_))).cloned()
    }

    /// Fields of a nested object attribute.
    pub fn fields(&self, name: &str) -> Option<Self> { self.object(name).as_ref().and_then(fields_of) }

    /// `filename`/`linenumber` for statements, `loc`/`location` tuples for ATL and screens.
    pub fn location(&self) -> Option<Location> {
        if let (Some(file), Some(line)) = (self.opt_str("filename"), self.get("linenumber").and_then(Value::as_int)) {
            return Some(Location::new(file, u32::try_from(line).unwrap_or(0)));
        }
        ["loc", "location"].iter().find_map(|key| {
            let pair = self.list(key);
            let file = pair.first().and_then(text_of)?;
            let line = pair.get(1).and_then(Value::as_int)?;
            Some(Location::new(file, u32::try_from(line).unwrap_or(0)))
        })
    }
}

/// Fields of `value` when it is an object.
pub fn fields_of(value: &Value) -> Option<Fields> {
    match value {
        Value::Object(o) => Some(Fields::of(&o.borrow())),
        _ => None,
    }
}

fn merge_state(map: &mut IndexMap<String, Value>, state: &Value) {
    match state {
        Value::Dict(d) => {
            for (k, v) in d.borrow().iter() {
                if let Some(k) = k.as_str() {
                    map.insert(k.to_owned(), v.clone());
                }
            }
        }
        // PyCode: (version, source, location, mode)
        Value::Tuple(t) if t.len() == 4 && t[0].as_int().is_some() => {
            for (key, v) in ["source", "location", "mode"].iter().zip(t[1..].iter()) {
                map.insert((*key).to_owned(), v.clone());
            }
        }
        // (instance dict, slot dict)
        Value::Tuple(t) if t.len() == 2 => {
            merge_state(map, &t[0]);
            merge_state(map, &t[1]);
        }
        _ => {}
    }
}

/// Source text carried by a value: strings, `PyExpr` (first constructor
/// argument), `PyCode` (`source`), and printable scalars.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(x) => Some(x.to_string()),
        Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_owned()),
        Value::Object(o) => {
            let o = o.borrow();
            if let Some(first @ (Value::Str(_) | Value::Bytes(_))) = o.args.first() {
                return text_of(first);
            }
            let mut map = IndexMap::new();
            if let Some(state) = &o.state {
                merge_state(&mut map, state);
            }
            match map.get("source") {
                Some(src @ (Value::Str(_) | Value::Bytes(_))) => text_of(src),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Elements of a sequence-like value. Revertable list/set subclasses keep
/// their elements in appended items, constructor arguments or set state.
pub fn seq(value: &Value) -> Vec<Value> {
    match value {
        Value::List(l) | Value::Set(l) => l.borrow().clone(),
        Value::Tuple(t) => t.to_vec(),
        Value::Object(o) => {
            let o = o.borrow();
            if !o.items.is_empty() {
                return o.items.clone();
            }
            if let Some(first @ (Value::List(_) | Value::Tuple(_) | Value::Set(_))) = o.args.first() {
                return seq(first);
            }
            match &o.state {
                Some(Value::Tuple(t)) if matches!(t.first(), Some(Value::Dict(_))) => {
                    entries(&t[0]).into_iter().map(|(k, _)| k).collect()
                }
                Some(s @ (Value::List(_) | Value::Set(_))) => seq(s),
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// Entries of a mapping-like value.
pub fn entries(value: &Value) -> Vec<(Value, Value)> {
    match value {
        Value::Dict(d) => d.borrow().clone(),
        Value::Object(o) => {
            let o = o.borrow();
            if !o.entries.is_empty() {
                return o.entries.clone();
            }
            match o.args.first() {
                Some(first @ Value::Dict(_)) => entries(first),
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// Strings of a sequence (non-text elements skipped).
pub fn texts(value: &Value) -> Vec<String> { seq(value).iter().filter_map(text_of).collect() }
