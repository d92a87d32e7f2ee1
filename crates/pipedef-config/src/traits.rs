//! Ordering between traits.

use pipedef_core::ResolvedJob;
use std::collections::HashSet;

/// `(trait, prerequisite)`: the prerequisite must be active and resolves first.
pub const TRAIT_PREREQUISITES: &[(&str, &str)] = &[
    ("component_descriptor", "version"),
    ("publish", "version"),
    ("release", "version"),
    ("update_component_deps", "component_descriptor"),
];

/// Known prerequisites of a trait.
pub fn prerequisites(trait_name: &str) -> impl Iterator<Item = &'static str> + '_ {
    TRAIT_PREREQUISITES
        .iter()
        .filter(move |(name, _)| *name == trait_name)
        .map(|(_, requires)| *requires)
}

/// The job's traits in the order they must be resolved: prerequisites first,
/// declaration order otherwise. Inactive prerequisites are skipped.
pub fn trait_order(job: &ResolvedJob) -> Vec<String> {
    let mut order = Vec::with_capacity(job.traits.len());
    let mut visited = HashSet::new();

    for name in job.traits.keys() {
        visit(job, name, &mut visited, &mut order);
    }
    order
}

fn visit<'a>(
    job: &'a ResolvedJob,
    name: &'a str,
    visited: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) {
    if !visited.insert(name) {
        return;
    }

    for requires in prerequisites(name) {
        if job.has_trait(requires) {
            visit(job, requires, visited, order);
        }
    }

    order.push(name.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pipedef_core::Trait;
    use serde_json::{Map, Value};

    fn job_with_traits(names: &[&str]) -> ResolvedJob {
        ResolvedJob {
            name: "job".to_string(),
            steps: IndexMap::new(),
            traits: names
                .iter()
                .map(|n| (n.to_string(), Trait::new(*n, Value::Null)))
                .collect(),
            settings: Map::new(),
        }
    }

    #[test]
    fn test_version_resolves_before_publish() {
        let job = job_with_traits(&["publish", "notifications", "version"]);
        assert_eq!(trait_order(&job), vec!["version", "publish", "notifications"]);
    }

    #[test]
    fn test_transitive_prerequisites() {
        let job = job_with_traits(&[
            "update_component_deps",
            "component_descriptor",
            "version",
        ]);
        assert_eq!(
            trait_order(&job),
            vec!["version", "component_descriptor", "update_component_deps"]
        );
    }

    #[test]
    fn test_missing_prerequisite_is_skipped() {
        let job = job_with_traits(&["release", "cronjob"]);
        assert_eq!(trait_order(&job), vec!["release", "cronjob"]);
    }

    #[test]
    fn test_prerequisites_lookup() {
        assert_eq!(prerequisites("publish").collect::<Vec<_>>(), vec!["version"]);
        assert_eq!(prerequisites("options").count(), 0);
    }
}
