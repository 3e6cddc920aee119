use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::PluginError;
use crate::manifest::PluginManifest;

/// Result of ordering a manifest set: the plugins that can load, in
/// dependency order, and the plugins that cannot — each paired with the
/// reason it was rejected. A plugin that names a dependency nobody
/// provides, or that sits in a dependency cycle (directly or
/// transitively), never reaches in-degree zero and so lands in
/// `rejected` without blocking any other, independent plugin from
/// loading.
pub struct Resolution {
    pub order: Vec<String>,
    pub rejected: Vec<(String, PluginError)>,
}

/// Orders manifests so that every plugin appears after all plugins it
/// depends on, via Kahn's algorithm. Plugins that can never be ordered —
/// because they depend on a name nothing provides, or because they sit
/// in a cycle — are isolated into `rejected` rather than failing the
/// whole batch; every plugin outside that set still loads in the order
/// its satisfied dependencies allow.
pub fn topological_order(manifests: &[PluginManifest]) -> Resolution {
    let known: HashSet<&str> = manifests.iter().map(|m| m.name.as_str()).collect();

    // dependents[dep] = plugins that depend on dep
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for manifest in manifests {
        in_degree.entry(manifest.name.as_str()).or_insert(0);
        for dep in &manifest.dependencies {
            *in_degree.entry(manifest.name.as_str()).or_insert(0) += 1;
            // A dependency nobody provides is never satisfied, so this
            // manifest's in-degree never reaches zero; no `dependents`
            // entry is needed for a name that will never get dequeued.
            if known.contains(dep.as_str()) {
                dependents.entry(dep.as_str()).or_default().push(&manifest.name);
            }
        }
    }

    let mut initial: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    initial.sort_unstable();
    let mut queue: VecDeque<&str> = initial.into();

    let mut ordered = Vec::with_capacity(manifests.len());
    while let Some(name) = queue.pop_front() {
        ordered.push(name.to_string());
        if let Some(deps_on_name) = dependents.get(name) {
            let mut newly_free = Vec::new();
            for dependent in deps_on_name {
                let degree = in_degree.get_mut(dependent).expect("known plugin");
                *degree -= 1;
                if *degree == 0 {
                    newly_free.push(*dependent);
                }
            }
            newly_free.sort_unstable();
            for name in newly_free {
                queue.push_back(name);
            }
        }
    }

    if ordered.len() == manifests.len() {
        return Resolution {
            order: ordered,
            rejected: Vec::new(),
        };
    }

    let resolved: HashSet<&str> = ordered.iter().map(|s| s.as_str()).collect();
    let stuck: Vec<String> = manifests
        .iter()
        .map(|m| m.name.clone())
        .filter(|name| !resolved.contains(name.as_str()))
        .collect();

    let mut rejected = Vec::new();
    for manifest in manifests {
        if resolved.contains(manifest.name.as_str()) {
            continue;
        }
        let reason = match manifest.dependencies.iter().find(|d| !known.contains(d.as_str())) {
            Some(missing) => PluginError::MissingDependency(manifest.name.clone(), missing.clone()),
            None => PluginError::DependencyCycle(stuck.clone()),
        };
        rejected.push((manifest.name.clone(), reason));
    }
    rejected.sort_by(|a, b| a.0.cmp(&b.0));

    Resolution {
        order: ordered,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, deps: &[&str]) -> PluginManifest {
        PluginManifest {
            class_path: format!("handlers::{name}"),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            author: None,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn independent_plugins_order_deterministically() {
        let manifests = vec![manifest("b", &[]), manifest("a", &[])];
        let res = topological_order(&manifests);
        assert!(res.rejected.is_empty());
        assert_eq!(res.order, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn dependency_is_ordered_before_dependent() {
        let manifests = vec![manifest("climate", &["climate-base"]), manifest("climate-base", &[])];
        let res = topological_order(&manifests);
        let base_idx = res.order.iter().position(|n| n == "climate-base").unwrap();
        let climate_idx = res.order.iter().position(|n| n == "climate").unwrap();
        assert!(base_idx < climate_idx);
    }

    #[test]
    fn diamond_dependency_resolves() {
        let manifests = vec![
            manifest("top", &["left", "right"]),
            manifest("left", &["base"]),
            manifest("right", &["base"]),
            manifest("base", &[]),
        ];
        let res = topological_order(&manifests);
        let pos = |n: &str| res.order.iter().position(|x| x == n).unwrap();
        assert!(pos("base") < pos("left"));
        assert!(pos("base") < pos("right"));
        assert!(pos("left") < pos("top"));
        assert!(pos("right") < pos("top"));
    }

    #[test]
    fn direct_cycle_is_detected() {
        let manifests = vec![manifest("a", &["b"]), manifest("b", &["a"])];
        let res = topological_order(&manifests);
        assert!(res.order.is_empty());
        assert_eq!(res.rejected.len(), 2);
        assert!(res
            .rejected
            .iter()
            .all(|(_, err)| matches!(err, PluginError::DependencyCycle(_))));
    }

    #[test]
    fn self_cycle_via_longer_chain_is_detected() {
        let manifests = vec![
            manifest("a", &["b"]),
            manifest("b", &["c"]),
            manifest("c", &["a"]),
        ];
        let res = topological_order(&manifests);
        assert!(res.order.is_empty());
        assert_eq!(res.rejected.len(), 3);
    }

    #[test]
    fn a_cycle_does_not_block_unrelated_plugins_from_loading() {
        // A (no deps), B (deps: [A]), C (deps: [A, B]) all resolve fine;
        // D depends on itself and is isolated as a rejection without
        // preventing A, B, C from loading.
        let manifests = vec![
            manifest("a", &[]),
            manifest("b", &["a"]),
            manifest("c", &["a", "b"]),
            manifest("d", &["d"]),
        ];
        let res = topological_order(&manifests);
        assert_eq!(res.order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(res.rejected.len(), 1);
        assert_eq!(res.rejected[0].0, "d");
        assert!(matches!(res.rejected[0].1, PluginError::DependencyCycle(_)));
    }

    #[test]
    fn missing_dependency_is_reported_without_blocking_others() {
        let manifests = vec![manifest("standalone", &[]), manifest("climate", &["climate-base"])];
        let res = topological_order(&manifests);
        assert_eq!(res.order, vec!["standalone".to_string()]);
        assert_eq!(res.rejected.len(), 1);
        assert_eq!(res.rejected[0].0, "climate");
        assert!(matches!(res.rejected[0].1, PluginError::MissingDependency(_, _)));
    }

    #[test]
    fn empty_input_orders_to_empty_output() {
        let res = topological_order(&[]);
        assert!(res.order.is_empty());
        assert!(res.rejected.is_empty());
    }
}
