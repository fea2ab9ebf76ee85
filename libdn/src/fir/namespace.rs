//! Fresh-name allocation.

use std::collections::HashSet;

use super::*;

/// Set of names in use inside one module.
#[derive(Debug, Default, Clone)]
pub struct Namespace {
    names: HashSet<String>,
}

impl Namespace {
    /// Creates new namespace seeded with every port and declared name of `module`.
    pub fn for_module(module: &Module) -> Self {
        let mut namespace = Self::default();
        for port in &module.ports {
            namespace.reserve(&port.name);
        }
        for name in module.body.declared_names() {
            namespace.reserve(&name);
        }
        namespace
    }

    /// Returns true if `name` is in use.
    pub fn contains(&self, name: &str) -> bool { self.names.contains(name) }

    /// Marks `name` as used. Returns false if it was already in use.
    pub fn reserve(&mut self, name: &str) -> bool { self.names.insert(name.to_string()) }

    /// Allocates a name based on `base`: `base` itself when unused, else `base_0`, `base_1`, ...
    pub fn new_name(&mut self, base: &str) -> String {
        if self.reserve(base) {
            return base.to_string();
        }

        let mut index = 0;
        loop {
            let name = format!("{}_{}", base, index);
            if self.reserve(&name) {
                return name;
            }
            index += 1;
        }
    }
}
