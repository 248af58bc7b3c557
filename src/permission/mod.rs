//! Role and capability resolution.
//!
//! Resolution is a pure function: (roles, per-identity overrides) -> capability
//! set. There is no caching; callers resolve from a freshly loaded identity so
//! role changes take effect on the next call. Unknown pairs deny.

pub mod resolver;

pub use resolver::PermissionResolver;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;

/// Matches any resource or action when used in either position.
pub const WILDCARD: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Capability {
    pub resource: String,
    pub action: String,
}

impl Capability {
    #[must_use]
    pub fn new(resource: &str, action: &str) -> Self {
        Self {
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }
}

/// Resolved capability set for one identity at one point in time.
#[derive(Clone, Debug, Default)]
pub struct PermissionSet {
    caps: HashSet<(String, String)>,
}

impl PermissionSet {
    #[must_use]
    pub fn from_capabilities<I>(caps: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        Self {
            caps: caps
                .into_iter()
                .map(|cap| (cap.resource, cap.action))
                .collect(),
        }
    }

    /// Fail-closed capability check with wildcard support.
    #[must_use]
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.caps.contains(&(resource.to_string(), action.to_string()))
            || self
                .caps
                .contains(&(resource.to_string(), WILDCARD.to_string()))
            || self
                .caps
                .contains(&(WILDCARD.to_string(), WILDCARD.to_string()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// Capabilities in a stable order, for API responses.
    #[must_use]
    pub fn to_sorted_capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<_> = self
            .caps
            .iter()
            .map(|(resource, action)| Capability {
                resource: resource.clone(),
                action: action.clone(),
            })
            .collect();
        caps.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_denies_everything() {
        let set = PermissionSet::default();
        assert!(!set.allows("tasks", "read"));
        assert!(!set.allows("anything", "at-all"));
    }

    #[test]
    fn exact_capability_allows() {
        let set = PermissionSet::from_capabilities([Capability::new("tasks", "read")]);
        assert!(set.allows("tasks", "read"));
        assert!(!set.allows("tasks", "delete"));
        assert!(!set.allows("notes", "read"));
    }

    #[test]
    fn resource_wildcard_allows_all_actions() {
        let set = PermissionSet::from_capabilities([Capability::new("notes", WILDCARD)]);
        assert!(set.allows("notes", "read"));
        assert!(set.allows("notes", "delete"));
        assert!(!set.allows("tasks", "read"));
    }

    #[test]
    fn full_wildcard_allows_everything() {
        let set = PermissionSet::from_capabilities([Capability::new(WILDCARD, WILDCARD)]);
        assert!(set.allows("tasks", "read"));
        assert!(set.allows("admin", "grant"));
    }
}
