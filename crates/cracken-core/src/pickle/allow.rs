//! Allow-lists consulted whenever the stream resolves a class.

use std::rc::Rc;

use super::{value::ClassTag, SecurityError, Value};

/// Data-only constructors the decoder can evaluate itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `set(iterable)`.
    Set,
    /// `frozenset(iterable)`.
    FrozenSet,
    /// `_codecs.encode(text, "latin-1")`, used for archive prefixes.
    Encode,
}

#[derive(Debug, Clone)]
enum Rule {
    /// `module == prefix` or `module` starts with `prefix.`
    Package(String),
    /// Exact `module.name`.
    Class(String, String),
    /// Exact `module.name` evaluated as a builtin.
    Builtin(String, String, Builtin),
}

/// Set of resolvable classes.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    rules: Vec<Rule>,
}

impl AllowList {
    /// Denies everything.
    pub fn empty() -> Self { Self::default() }

    /// Compiled scripts: anything under `renpy` plus `set`/`frozenset`.
    pub fn script() -> Self {
        let mut a = Self::empty().allow_package("renpy");
        for module in ["builtins", "__builtin__"] {
            a = a.allow_builtin(module, "set", Builtin::Set).allow_builtin(module, "frozenset", Builtin::FrozenSet);
        }
        a
    }

    /// Archive indexes: plain data plus `_codecs.encode`.
    pub fn archive_index() -> Self { Self::empty().allow_builtin("_codecs", "encode", Builtin::Encode) }

    /// Allows every class under `package`.
    pub fn allow_package(mut self, package: &str) -> Self {
        self.rules.push(Rule::Package(package.to_owned()));
        self
    }

    /// Allows a single class.
    pub fn allow_class(mut self, module: &str, name: &str) -> Self {
        self.rules.push(Rule::Class(module.to_owned(), name.to_owned()));
        self
    }

    fn allow_builtin(mut self, module: &str, name: &str, b: Builtin) -> Self {
        self.rules.push(Rule::Builtin(module.to_owned(), name.to_owned(), b));
        self
    }

    /// Checks `module.name` and turns it into a stack value.
    pub fn resolve(&self, module: &str, name: &str) -> Result<Value, SecurityError> {
        for rule in &self.rules {
            match rule {
                Rule::Builtin(m, n, b) if m == module && n == name => return Ok(Value::Builtin(*b)),
                Rule::Class(m, n) if m == module && n == name => {
                    return Ok(Value::Class(Rc::new(ClassTag::new(module, name))));
                }
                Rule::Package(p) if in_package(module, p) => {
                    return Ok(Value::Class(Rc::new(ClassTag::new(module, name))));
                }
                _ => {}
            }
        }
        log::debug!("refusing class {module}.{name}");
        Err(SecurityError::DisallowedClass { module: module.to_owned(), name: name.to_owned() })
    }

    /// True when `resolve` would succeed.
    pub fn allows(&self, module: &str, name: &str) -> bool { self.resolve(module, name).is_ok() }
}

fn in_package(module: &str, package: &str) -> bool {
    module == package || module.strip_prefix(package).is_some_and(|rest| rest.starts_with('.'))
}
