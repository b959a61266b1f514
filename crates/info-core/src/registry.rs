//! The Endpoint Registry: four tables mapping names to handlers, looked up
//! in a fixed order (static -> dynamic -> tree -> command) with
//! first-hit-wins semantics.
//!
//! Built around ordered maps keyed by name (`IndexMap<K, Bundle>`), one
//! table per kind. An Info endpoint is a plain function pointer rather than
//! a heterogeneous trait object, so lookups dispatch through a tagged enum
//! instead of any dynamic-typing machinery.
//!
//! Re-registration during live dispatch is forbidden by convention; the
//! registry is populated once at startup and then read through an
//! immutable snapshot `Arc` swapped under a write lock, so reads never
//! contend with each other and never observe a partially-built table.

use crate::buf::DynBuf;
use crate::error::Result;
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};

/// A static endpoint: name maps to an opaque, pre-rendered byte value.
#[derive(Clone)]
pub struct StaticEndpoint {
    pub value: Vec<u8>,
    /// Included in the "dump all defaults" response (empty-body request).
    pub default: bool,
}

pub type DynamicFn = Arc<dyn Fn(&str, &mut DynBuf) -> Result<()> + Send + Sync>;
pub type TreeFn = Arc<dyn Fn(&str, &str, &mut DynBuf) -> Result<()> + Send + Sync>;
pub type CommandFn = Arc<dyn Fn(&str, &str, &mut DynBuf) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub struct DynamicEndpoint {
    pub produce: DynamicFn,
    pub default: bool,
}

#[derive(Clone)]
pub struct TreeEndpoint {
    pub produce: TreeFn,
}

/// Command handlers additionally carry the permission required to invoke
/// them; the dispatcher checks this against the connection's principal
/// before calling `produce`.
#[derive(Clone)]
pub struct CommandEndpoint {
    pub produce: CommandFn,
    pub permission: &'static str,
}

#[derive(Default, Clone)]
struct Snapshot {
    statics: IndexMap<String, StaticEndpoint>,
    dynamics: IndexMap<String, DynamicEndpoint>,
    trees: IndexMap<String, TreeEndpoint>,
    commands: IndexMap<String, CommandEndpoint>,
}

/// The registry. Registration serializes on an internal mutex (the write
/// side of the lock below); lookups read through a cloned `Arc<Snapshot>`
/// and never block a concurrent writer or another reader.
pub struct Registry {
    snapshot: RwLock<Arc<Snapshot>>,
}

/// The four variants the dispatcher searches, in this fixed order, stopping
/// at the first hit.
pub enum Lookup {
    Static(Vec<u8>),
    Dynamic(DynamicFn),
    Tree(TreeFn),
    Command { produce: CommandFn, permission: &'static str },
}

impl Registry {
    pub fn new() -> Registry {
        Registry { snapshot: RwLock::new(Arc::new(Snapshot::default())) }
    }

    fn edit(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut guard = self.snapshot.write().expect("registry lock poisoned");
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Registers (or overwrites) a static value. An empty value clears the
    /// entry; this is the only runtime "unregister" supported.
    pub fn register_static(&self, name: impl Into<String>, value: Vec<u8>, default: bool) {
        let name = name.into();
        self.edit(move |s| {
            if value.is_empty() {
                s.statics.shift_remove(&name);
            } else {
                s.statics.insert(name, StaticEndpoint { value, default });
            }
        });
    }

    pub fn register_dynamic<F>(&self, name: impl Into<String>, default: bool, produce: F)
    where
        F: Fn(&str, &mut DynBuf) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let produce: DynamicFn = Arc::new(produce);
        self.edit(move |s| {
            s.dynamics.insert(name, DynamicEndpoint { produce, default });
        });
    }

    pub fn register_tree<F>(&self, name: impl Into<String>, produce: F)
    where
        F: Fn(&str, &str, &mut DynBuf) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let produce: TreeFn = Arc::new(produce);
        self.edit(move |s| {
            s.trees.insert(name, TreeEndpoint { produce });
        });
    }

    pub fn register_command<F>(&self, name: impl Into<String>, permission: &'static str, produce: F)
    where
        F: Fn(&str, &str, &mut DynBuf) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let produce: CommandFn = Arc::new(produce);
        self.edit(move |s| {
            s.commands.insert(name, CommandEndpoint { produce, permission });
        });
    }

    /// Resolves a bare lookup name (`static` -> `dynamic` -> `tree`, splitting
    /// on `/` for the tree table), in registry order, stopping at first hit.
    pub fn lookup(&self, name: &str) -> Option<Lookup> {
        let snap = self.snapshot.read().expect("registry lock poisoned").clone();

        if let Some(entry) = snap.statics.get(name) {
            return Some(Lookup::Static(entry.value.clone()));
        }
        if let Some(entry) = snap.dynamics.get(name) {
            return Some(Lookup::Dynamic(entry.produce.clone()));
        }
        if let Some((base, _subtree)) = name.split_once('/') {
            if let Some(entry) = snap.trees.get(base) {
                return Some(Lookup::Tree(entry.produce.clone()));
            }
        }
        None
    }

    pub fn lookup_command(&self, name: &str) -> Option<Lookup> {
        let snap = self.snapshot.read().expect("registry lock poisoned").clone();
        snap.commands.get(name).map(|entry| Lookup::Command {
            produce: entry.produce.clone(),
            permission: entry.permission,
        })
    }

    /// All default-flagged static and dynamic names, in registration order,
    /// for the empty-body "dump all defaults" request.
    pub fn defaults(&self) -> Vec<(String, DefaultValue)> {
        let snap = self.snapshot.read().expect("registry lock poisoned").clone();
        let mut out = Vec::new();

        for (name, entry) in snap.statics.iter() {
            if entry.default {
                out.push((name.clone(), DefaultValue::Static(entry.value.clone())));
            }
        }
        for (name, entry) in snap.dynamics.iter() {
            if entry.default {
                out.push((name.clone(), DefaultValue::Dynamic(entry.produce.clone())));
            }
        }

        out
    }
}

pub enum DefaultValue {
    Static(Vec<u8>),
    Dynamic(DynamicFn),
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_beats_dynamic_beats_tree_on_name_collision() {
        let reg = Registry::new();
        reg.register_tree("x", |_, _, buf| {
            buf.append_str("tree");
            Ok(())
        });
        reg.register_dynamic("x", false, |_, buf| {
            buf.append_str("dynamic");
            Ok(())
        });
        reg.register_static("x", b"static".to_vec(), false);

        match reg.lookup("x") {
            Some(Lookup::Static(v)) => assert_eq!(v, b"static"),
            _ => panic!("expected static hit"),
        }
    }

    #[test]
    fn re_registering_a_name_overwrites_the_handler() {
        let reg = Registry::new();
        reg.register_static("version", b"1".to_vec(), true);
        reg.register_static("version", b"2".to_vec(), true);

        match reg.lookup("version") {
            Some(Lookup::Static(v)) => assert_eq!(v, b"2"),
            _ => panic!("expected static hit"),
        }
    }

    #[test]
    fn empty_value_clears_a_static_entry() {
        let reg = Registry::new();
        reg.register_static("temp", b"x".to_vec(), false);
        reg.register_static("temp", Vec::new(), false);

        assert!(reg.lookup("temp").is_none());
    }

    #[test]
    fn tree_lookup_splits_on_slash() {
        let reg = Registry::new();
        reg.register_tree("namespace", |_, subtree, buf| {
            buf.append_str(subtree);
            Ok(())
        });

        assert!(matches!(reg.lookup("namespace/test"), Some(Lookup::Tree(_))));
    }

    #[test]
    fn defaults_only_includes_default_flagged_entries() {
        let reg = Registry::new();
        reg.register_static("a", b"1".to_vec(), true);
        reg.register_static("b", b"2".to_vec(), false);

        assert_eq!(reg.defaults().len(), 1);
    }
}
