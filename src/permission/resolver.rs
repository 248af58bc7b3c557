//! Role definitions and the resolve step.

use std::collections::HashMap;

use super::{Capability, PermissionSet, WILDCARD};

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const ROLE_SERVICE: &str = "service";

/// Maps role names to capability grants. Unknown roles contribute nothing.
#[derive(Clone, Debug)]
pub struct PermissionResolver {
    roles: HashMap<String, Vec<Capability>>,
}

impl PermissionResolver {
    /// Resolver pre-loaded with the built-in Lexicon roles.
    #[must_use]
    pub fn with_builtin_roles() -> Self {
        let mut resolver = Self {
            roles: HashMap::new(),
        };
        resolver.define_role(ROLE_OWNER, vec![Capability::new(WILDCARD, WILDCARD)]);
        resolver.define_role(ROLE_ADMIN, vec![Capability::new(WILDCARD, WILDCARD)]);
        resolver.define_role(
            ROLE_USER,
            vec![
                Capability::new("tasks", WILDCARD),
                Capability::new("notes", WILDCARD),
                Capability::new("files", WILDCARD),
                Capability::new("settings", WILDCARD),
            ],
        );
        resolver.define_role(
            ROLE_SERVICE,
            vec![
                Capability::new("tasks", "read"),
                Capability::new("notes", "read"),
                Capability::new("files", "read"),
            ],
        );
        resolver
    }

    pub fn define_role(&mut self, name: &str, capabilities: Vec<Capability>) {
        self.roles.insert(name.to_string(), capabilities);
    }

    /// Union of role capabilities and per-identity overrides.
    #[must_use]
    pub fn resolve(&self, roles: &[String], overrides: &[Capability]) -> PermissionSet {
        let role_caps = roles
            .iter()
            .filter_map(|role| self.roles.get(role))
            .flatten()
            .cloned();
        PermissionSet::from_capabilities(role_caps.chain(overrides.iter().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_role_covers_own_modules_only() {
        let resolver = PermissionResolver::with_builtin_roles();
        let set = resolver.resolve(&[ROLE_USER.to_string()], &[]);
        assert!(set.allows("tasks", "create"));
        assert!(set.allows("notes", "delete"));
        assert!(!set.allows("admin", "grant"));
    }

    #[test]
    fn admin_role_is_wildcard() {
        let resolver = PermissionResolver::with_builtin_roles();
        let set = resolver.resolve(&[ROLE_ADMIN.to_string()], &[]);
        assert!(set.allows("admin", "grant"));
        assert!(set.allows("tasks", "delete"));
    }

    #[test]
    fn unknown_role_resolves_to_nothing() {
        let resolver = PermissionResolver::with_builtin_roles();
        let set = resolver.resolve(&["mystery".to_string()], &[]);
        assert!(set.is_empty());
    }

    #[test]
    fn overrides_extend_role_grants() {
        let resolver = PermissionResolver::with_builtin_roles();
        let set = resolver.resolve(
            &[ROLE_SERVICE.to_string()],
            &[Capability::new("tasks", "create")],
        );
        assert!(set.allows("tasks", "read"));
        assert!(set.allows("tasks", "create"));
        assert!(!set.allows("notes", "create"));
    }

    #[test]
    fn role_changes_apply_on_next_resolution() {
        let mut resolver = PermissionResolver::with_builtin_roles();
        let roles = vec![ROLE_SERVICE.to_string()];
        assert!(!resolver.resolve(&roles, &[]).allows("notes", "create"));
        resolver.define_role(ROLE_SERVICE, vec![Capability::new("notes", WILDCARD)]);
        assert!(resolver.resolve(&roles, &[]).allows("notes", "create"));
    }
}
