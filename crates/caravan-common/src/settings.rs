//! Default resource sets for backup construction
//!
//! The included/excluded resource lists applied to initial and stage backups
//! are deployment configuration, not algorithm constants: operators override
//! them per installation via environment variables. The sets are ordered
//! (BTreeSet) so repeated runs submit identical resource lists and the
//! remote objects do not churn.

use std::collections::BTreeSet;

/// Env var overriding the initial-backup included resources
pub const INITIAL_INCLUDED_ENV: &str = "CARAVAN_INITIAL_INCLUDED_RESOURCES";

/// Env var overriding the initial-backup excluded resources
pub const INITIAL_EXCLUDED_ENV: &str = "CARAVAN_INITIAL_EXCLUDED_RESOURCES";

/// Env var overriding the stage-backup included resources
pub const STAGE_INCLUDED_ENV: &str = "CARAVAN_STAGE_INCLUDED_RESOURCES";

/// Env var overriding the stage-backup excluded resources
pub const STAGE_EXCLUDED_ENV: &str = "CARAVAN_STAGE_EXCLUDED_RESOURCES";

/// Resources excluded from initial backups unless overridden
///
/// Event streams, leases, and operator-catalog resources are either noise or
/// re-created by their owners on the destination.
const DEFAULT_INITIAL_EXCLUDED: &[&str] = &[
    "clusterserviceversions",
    "events",
    "events.events.k8s.io",
    "imagetags",
    "leases.coordination.k8s.io",
    "operatorgroups",
    "packagemanifests",
    "subscriptions",
    "templateinstances",
];

/// Resources included in stage backups unless overridden
const DEFAULT_STAGE_INCLUDED: &[&str] = &[
    "configmaps",
    "imagestreams",
    "imagestreamtags",
    "namespaces",
    "persistentvolumeclaims",
    "persistentvolumes",
    "pods",
    "secrets",
    "serviceaccounts",
];

/// Configured include/exclude resource sets for backup construction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDefaults {
    /// Resources included in initial backups; empty means "everything"
    pub initial_included: BTreeSet<String>,
    /// Resources excluded from initial backups
    pub initial_excluded: BTreeSet<String>,
    /// Resources included in stage backups
    pub stage_included: BTreeSet<String>,
    /// Resources excluded from stage backups
    pub stage_excluded: BTreeSet<String>,
}

impl Default for ResourceDefaults {
    fn default() -> Self {
        Self {
            initial_included: BTreeSet::new(),
            initial_excluded: to_set(DEFAULT_INITIAL_EXCLUDED),
            stage_included: to_set(DEFAULT_STAGE_INCLUDED),
            stage_excluded: BTreeSet::new(),
        }
    }
}

impl ResourceDefaults {
    /// Load the defaults, applying any environment overrides
    pub fn from_env() -> Self {
        let builtin = Self::default();
        Self {
            initial_included: env_set(INITIAL_INCLUDED_ENV).unwrap_or(builtin.initial_included),
            initial_excluded: env_set(INITIAL_EXCLUDED_ENV).unwrap_or(builtin.initial_excluded),
            stage_included: env_set(STAGE_INCLUDED_ENV).unwrap_or(builtin.stage_included),
            stage_excluded: env_set(STAGE_EXCLUDED_ENV).unwrap_or(builtin.stage_excluded),
        }
    }
}

/// Ordered difference: `defaults \ excluded`, as the list submitted remotely
pub fn included_resources(defaults: &BTreeSet<String>, excluded: &[String]) -> Vec<String> {
    defaults
        .iter()
        .filter(|r| !excluded.contains(r))
        .cloned()
        .collect()
}

/// Ordered union: `defaults ∪ excluded`, as the list submitted remotely
pub fn excluded_resources(defaults: &BTreeSet<String>, excluded: &[String]) -> Vec<String> {
    let mut merged = defaults.clone();
    merged.extend(excluded.iter().cloned());
    merged.into_iter().collect()
}

fn to_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn env_set(var: &str) -> Option<BTreeSet<String>> {
    let raw = std::env::var(var).ok()?;
    Some(parse_list(&raw))
}

fn parse_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_ordered() {
        let defaults = ResourceDefaults::default();
        let stage: Vec<_> = defaults.stage_included.iter().cloned().collect();
        let mut sorted = stage.clone();
        sorted.sort();
        assert_eq!(stage, sorted);
        assert!(defaults.stage_included.contains("persistentvolumes"));
        assert!(defaults.initial_excluded.contains("events"));
        assert!(defaults.initial_included.is_empty());
    }

    #[test]
    fn test_included_resources_difference() {
        let defaults: BTreeSet<String> = ["pods", "secrets", "configmaps"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let excluded = vec!["secrets".to_string(), "routes".to_string()];
        assert_eq!(
            included_resources(&defaults, &excluded),
            vec!["configmaps".to_string(), "pods".to_string()]
        );
    }

    #[test]
    fn test_excluded_resources_union() {
        let defaults: BTreeSet<String> = ["events".to_string()].into_iter().collect();
        let excluded = vec!["routes".to_string(), "events".to_string()];
        assert_eq!(
            excluded_resources(&defaults, &excluded),
            vec!["events".to_string(), "routes".to_string()]
        );
    }

    #[test]
    fn test_parse_list() {
        let set = parse_list("pods, secrets ,,configmaps");
        assert_eq!(set.len(), 3);
        assert!(set.contains("secrets"));
    }

    #[test]
    fn test_set_arithmetic_deterministic() {
        let defaults = ResourceDefaults::default();
        let excluded = vec!["pods".to_string()];
        let first = included_resources(&defaults.stage_included, &excluded);
        let second = included_resources(&defaults.stage_included, &excluded);
        assert_eq!(first, second);
        assert!(!first.contains(&"pods".to_string()));
    }
}
