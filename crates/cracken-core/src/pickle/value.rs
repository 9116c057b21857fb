//! Decoded value graph.
//!
//! Aggregates that later opcodes may mutate (lists, dicts, sets, objects) live
//! behind [`Shared`] handles: a memo GET clones the handle, so every alias sees
//! the same logical value and identity can be checked with [`Value::ptr_eq`].

use std::{cell::RefCell, fmt, rc::Rc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::allow::Builtin;

/// Shared, mutable handle.
pub type Shared<T> = Rc<RefCell<T>>;

/// `module.name` of a resolved class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassTag {
    /// Dotted module path.
    pub module: String,
    /// Attribute name inside the module.
    pub name: String,
}

impl ClassTag {
    /// Builds a tag.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self { module: module.into(), name: name.into() }
    }
    /// `module.name`.
    pub fn qualified(&self) -> String { format!("{}.{}", self.module, self.name) }
    /// True for `module == m && name == n`.
    pub fn is(&self, module: &str, name: &str) -> bool { self.module == module && self.name == name }
}

impl fmt::Display for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}.{}", self.module, self.name) }
}

/// Skeleton of an allow-listed instance. Nothing is ever executed: the decoder
/// only records what the stream asked for.
#[derive(Debug, Clone)]
pub struct Object {
    /// Resolved class.
    pub class: Rc<ClassTag>,
    /// Positional constructor arguments (NEWOBJ / REDUCE / INST / OBJ).
    pub args: Vec<Value>,
    /// Keyword constructor arguments (NEWOBJ_EX).
    pub kwargs: Vec<(Value, Value)>,
    /// State handed to BUILD (usually a dict, sometimes a tuple).
    pub state: Option<Value>,
    /// Items appended to list/set subclasses.
    pub items: Vec<Value>,
    /// Items set on dict subclasses.
    pub entries: Vec<(Value, Value)>,
}

impl Object {
    /// Fresh skeleton for `class` built from `args`.
    pub fn new(class: Rc<ClassTag>, args: Vec<Value>) -> Self {
        Self { class, args, kwargs: Vec::new(), state: None, items: Vec::new(), entries: Vec::new() }
    }
}

/// One decoded value.
#[derive(Clone)]
pub enum Value {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// Integer (up to 64 bits).
    Int(i64),
    /// Float.
    Float(f64),
    /// Text.
    Str(Rc<str>),
    /// Raw bytes.
    Bytes(Rc<[u8]>),
    /// Mutable list.
    List(Shared<Vec<Value>>),
    /// Immutable tuple.
    Tuple(Rc<[Value]>),
    /// Insertion-ordered dict.
    Dict(Shared<Vec<(Value, Value)>>),
    /// Set / frozenset (insertion order kept).
    Set(Shared<Vec<Value>>),
    /// Allow-listed object skeleton.
    Object(Shared<Object>),
    /// Resolved, allow-listed class reference.
    Class(Rc<ClassTag>),
    /// Data-only builtin constructor (`set`, `frozenset`, `_codecs.encode`).
    Builtin(Builtin),
}

impl Value {
    /// Text value.
    pub fn str(s: &str) -> Self { Value::Str(Rc::from(s)) }
    /// New empty list.
    pub fn new_list(items: Vec<Value>) -> Self { Value::List(Rc::new(RefCell::new(items))) }
    /// New dict.
    pub fn new_dict(entries: Vec<(Value, Value)>) -> Self { Value::Dict(Rc::new(RefCell::new(entries))) }
    /// New set.
    pub fn new_set(items: Vec<Value>) -> Self { Value::Set(Rc::new(RefCell::new(items))) }
    /// New tuple.
    pub fn tuple(items: Vec<Value>) -> Self { Value::Tuple(Rc::from(items)) }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Object(_) => "object",
            Value::Class(_) => "class",
            Value::Builtin(_) => "builtin",
        }
    }

    /// True for `None`.
    pub fn is_none(&self) -> bool { matches!(self, Value::None) }

    /// Borrowed text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value (bools count as 0/1).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Truthiness following the host language rules for plain data.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) | Value::Set(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Object(_) | Value::Class(_) | Value::Builtin(_) => true,
        }
    }

    /// Class tag when this is an object skeleton.
    pub fn class(&self) -> Option<Rc<ClassTag>> {
        match self {
            Value::Object(o) => Some(Rc::clone(&o.borrow().class)),
            _ => None,
        }
    }

    /// Reference identity for shared aggregates, value identity for the rest of
    /// the `Rc`-backed variants. Scalars are never identical.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Address of the shared allocation, used to detect reference cycles.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(l) | Value::Set(l) => Some(Rc::as_ptr(l).cast::<()>() as usize),
            Value::Dict(d) => Some(Rc::as_ptr(d).cast::<()>() as usize),
            Value::Object(o) => Some(Rc::as_ptr(o).cast::<()>() as usize),
            Value::Tuple(t) => Some(Rc::as_ptr(t).cast::<()>() as usize),
            _ => None,
        }
    }

    /// Equality usable for dict keys: scalars, text, bytes and tuples of those.
    pub fn key_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => i64::from(*a) == *b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.key_eq(y)),
            _ => self.ptr_eq(other),
        }
    }

    /// Looks `key` up in a dict value.
    pub fn dict_get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Dict(d) => d.borrow().iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v.clone()),
            _ => None,
        }
    }
}

/// Inserts or replaces `key` in an ordered entry list.
pub(crate) fn dict_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    if let Some(slot) = entries.iter_mut().find(|(k, _)| k.key_eq(&key)) {
        slot.1 = value;
    } else {
        entries.push((key, value));
    }
}

// Shallow on purpose: shared graphs may be cyclic.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => {
                if s.chars().count() > 64 {
                    let head: String = s.chars().take(64).collect();
                    write!(f, "Str({head:?}…)")
                } else {
                    write!(f, "Str({s:?})")
                }
            }
            Value::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            Value::List(l) => write!(f, "List(len={})", l.borrow().len()),
            Value::Tuple(t) => write!(f, "Tuple(len={})", t.len()),
            Value::Dict(d) => write!(f, "Dict(len={})", d.borrow().len()),
            Value::Set(s) => write!(f, "Set(len={})", s.borrow().len()),
            Value::Object(o) => write!(f, "Object({})", o.borrow().class),
            Value::Class(c) => write!(f, "Class({c})"),
            Value::Builtin(b) => write!(f, "Builtin({b:?})"),
        }
    }
}

impl From<&str> for Value { fn from(v: &str) -> Self { Value::str(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Str(Rc::from(v)) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
