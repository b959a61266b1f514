//! Connection-scoped authorization (spec.md §4.H). A `Principal` carries
//! the set of permission names its connection was granted at login; command
//! endpoints each declare the single permission they require.
//!
//! Grounded in spec.md's command-endpoint table, which pairs every command
//! name with a permission string (`sindex-admin`, `udf-admin`, `truncate`,
//! and so on); the dispatcher checks membership before invoking a command
//! handler at all.

use std::collections::HashSet;

#[derive(Clone)]
pub struct Principal {
    name: String,
    permissions: HashSet<&'static str>,
    /// The root principal (an un-authenticated connection when security is
    /// disabled, or a superuser role) bypasses the permission set entirely.
    is_root: bool,
}

impl Principal {
    pub fn new(name: impl Into<String>, permissions: HashSet<&'static str>) -> Principal {
        Principal { name: name.into(), permissions, is_root: false }
    }

    /// The principal used when `enable-security` is off: every command is
    /// allowed, matching the community-edition posture of having no RBAC
    /// layer to enforce in the first place.
    pub fn root() -> Principal {
        Principal { name: "root".to_string(), permissions: HashSet::new(), is_root: true }
    }

    /// An authenticated-but-unprivileged connection, granted nothing.
    pub fn anonymous() -> Principal {
        Principal { name: "anonymous".to_string(), permissions: HashSet::new(), is_root: false }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allows(&self, permission: &str) -> bool {
        self.is_root || self.permissions.contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_allows_any_permission() {
        let root = Principal::root();
        assert!(root.allows("sindex-admin"));
        assert!(root.allows("anything"));
    }

    #[test]
    fn anonymous_allows_nothing() {
        let anon = Principal::anonymous();
        assert!(!anon.allows("sindex-admin"));
    }

    #[test]
    fn custom_principal_allows_only_its_granted_set() {
        let mut perms = HashSet::new();
        perms.insert("sindex-admin");
        let p = Principal::new("operator", perms);

        assert!(p.allows("sindex-admin"));
        assert!(!p.allows("udf-admin"));
    }
}
