//! Compiled-in `(module, name) → builder` table.

use std::collections::HashMap;

use cracken_core::pickle::ClassTag;

use crate::{atl, reconstruct::Reconstructor, screen, script, Fields, Node};

/// Turns one object's fields into a node. Builders recurse through the
/// [`Reconstructor`] for nested statements.
pub type Builder = fn(&Fields, &mut Reconstructor<'_>) -> Node;

/// Node builders keyed by `"module.name"`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    builders: HashMap<String, Builder>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self { Self::default() }

    /// Every statement, ATL and screen-language kind.
    pub fn standard() -> Self {
        let mut r = Self::new();
        script::register(&mut r);
        atl::register(&mut r);
        screen::register(&mut r);
        log::trace!("node registry: {} builders", r.len());
        r
    }

    /// Registers (or replaces) one builder.
    pub fn register(&mut self, module: &str, name: &str, builder: Builder) {
        self.builders.insert(format!("{module}.{name}"), builder);
    }

    /// Registers several builders of one module.
    pub fn register_all(&mut self, module: &str, entries: &[(&str, Builder)]) {
        for (name, builder) in entries {
            self.register(module, name, *builder);
        }
    }

    /// Builder for `class`.
    pub fn get(&self, class: &ClassTag) -> Option<Builder> { self.builders.get(&class.qualified()).copied() }

    /// True when `module.name` has a builder.
    pub fn contains(&self, module: &str, name: &str) -> bool { self.builders.contains_key(&format!("{module}.{name}")) }

    /// Number of builders.
    pub fn len(&self) -> usize { self.builders.len() }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool { self.builders.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeKind;

    #[test]
    fn standard_covers_every_family() {
        let r = Registry::standard();
        for (module, name) in [
            ("renpy.ast", "Label"),
            ("renpy.ast", "TranslateEarlyBlock"),
            ("renpy.ast", "RPY"),
            ("renpy.atl", "RawMultipurpose"),
            ("renpy.atl", "RawOn"),
            ("renpy.sl2.slast", "SLScreen"),
            ("renpy.sl2.slast", "SLCustomUse"),
        ] {
            assert!(r.contains(module, name), "{module}.{name}");
        }
        assert!(!r.contains("renpy.ast", "Node"));
    }

    #[test]
    fn register_replaces() {
        fn pass(_: &Fields, _: &mut Reconstructor<'_>) -> Node { Node::new(NodeKind::Pass) }
        let mut r = Registry::new();
        assert!(r.is_empty());
        r.register_all("m", &[("A", pass), ("B", pass)]);
        r.register("m", "A", pass);
        assert_eq!(r.len(), 2);
        assert!(r.get(&ClassTag::new("m", "B")).is_some());
    }
}
