//! Dependency resolver - builds migration plans from resource snapshots
//!
//! The resolver turns a snapshot of source resources into a
//! [`MigrationOrder`]: levels of resources where everything a resource
//! depends on has been migrated in an earlier level.
//!
//! Edges come from two places:
//! - references discovered in each node's payload, restricted to the snapshot
//! - a fixed kind-level policy: target servers and KVMs are always
//!   independent leaves, proxies follow every shared flow, API products and
//!   developers follow every proxy, and developer apps follow every proxy,
//!   product and developer of the snapshot

use crate::error::CycleError;
use crate::types::{MigrationOrder, ResourceKind, ResourceNode, ResourceRef, Scope};
use std::collections::{BTreeMap, BTreeSet};

/// Directed graph of dependent → dependencies, keyed by resource
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<ResourceRef, BTreeSet<ResourceRef>>,
    /// Dropped or ignored references noticed while building
    pub warnings: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph for a snapshot
    ///
    /// References to resources outside the snapshot are dropped with a
    /// warning rather than treated as edges.
    pub fn build(snapshot: &[ResourceNode]) -> Self {
        let mut warnings = Vec::new();
        let mut nodes: BTreeMap<&ResourceRef, &ResourceNode> = BTreeMap::new();
        for node in snapshot {
            if nodes.insert(&node.reference, node).is_some() {
                warnings.push(format!(
                    "{} appears more than once in the snapshot; keeping the last copy",
                    node.reference
                ));
            }
        }

        let mut by_name: BTreeMap<(ResourceKind, &str), Vec<&ResourceRef>> = BTreeMap::new();
        let mut by_kind: BTreeMap<ResourceKind, Vec<&ResourceRef>> = BTreeMap::new();
        for (reference, node) in &nodes {
            by_name
                .entry((reference.kind, reference.name.as_str()))
                .or_default()
                .push(reference);
            if let Some(alias) = node.alias() {
                by_name.entry((reference.kind, alias)).or_default().push(reference);
            }
            by_kind.entry(reference.kind).or_default().push(reference);
        }

        let mut edges = BTreeMap::new();
        for (reference, node) in &nodes {
            let mut deps = BTreeSet::new();

            if reference.kind.is_independent_leaf() {
                if !node.references.is_empty() {
                    warnings.push(format!(
                        "{}: ignoring {} reference(s); {} have no dependencies",
                        reference,
                        node.references.len(),
                        reference.kind.label().to_lowercase()
                    ));
                }
            } else {
                for dep in &node.references {
                    match lookup(dep, &by_name) {
                        Some(found) => {
                            deps.insert(found.clone());
                        }
                        None => warnings.push(format!(
                            "{reference} references {dep}, which is not part of this migration"
                        )),
                    }
                }
            }

            for kind in reference.kind.prerequisite_kinds() {
                deps.extend(by_kind.get(kind).into_iter().flatten().map(|r| (*r).clone()));
            }

            edges.insert((*reference).clone(), deps);
        }

        for warning in &warnings {
            log::warn!("{warning}");
        }

        Self { edges, warnings }
    }

    /// Number of resources in the graph
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// In-snapshot dependencies of a resource
    pub fn dependencies(&self, reference: &ResourceRef) -> Option<&BTreeSet<ResourceRef>> {
        self.edges.get(reference)
    }

    /// Layer the graph with Kahn's algorithm
    ///
    /// Level 0 holds resources with no dependencies; level `k` holds the
    /// resources whose dependencies all sit in levels below `k`. Each level
    /// is sorted by (kind, name).
    pub fn layers(&self) -> Result<Vec<Vec<ResourceRef>>, CycleError> {
        let mut pending: BTreeMap<&ResourceRef, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&ResourceRef, Vec<&ResourceRef>> = BTreeMap::new();

        for (reference, deps) in &self.edges {
            pending.insert(reference, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(reference);
            }
        }

        let mut ready: Vec<&ResourceRef> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(r, _)| *r)
            .collect();
        let mut levels = Vec::new();

        while !ready.is_empty() {
            ready.sort();
            let mut next = Vec::new();

            for reference in &ready {
                pending.remove(reference);
                for dependent in dependents.get(reference).into_iter().flatten() {
                    if let Some(count) = pending.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }

            levels.push(ready.iter().map(|r| (*r).clone()).collect());
            ready = next;
        }

        if pending.is_empty() {
            Ok(levels)
        } else {
            let residual: BTreeSet<&ResourceRef> = pending.keys().copied().collect();
            Err(CycleError {
                members: self.cycle_members(&residual),
            })
        }
    }

    /// Resources of `residual` that can reach themselves
    ///
    /// The residual set also holds resources that merely depend on a cycle;
    /// only the ones actually on a cycle are reported.
    fn cycle_members(&self, residual: &BTreeSet<&ResourceRef>) -> Vec<ResourceRef> {
        residual
            .iter()
            .filter(|start| self.reaches(start, start, residual))
            .map(|r| (*r).clone())
            .collect()
    }

    fn reaches(
        &self,
        from: &ResourceRef,
        target: &ResourceRef,
        within: &BTreeSet<&ResourceRef>,
    ) -> bool {
        let mut seen: BTreeSet<&ResourceRef> = BTreeSet::new();
        let mut stack: Vec<&ResourceRef> = vec![from];

        while let Some(current) = stack.pop() {
            for dep in self.edges.get(current).into_iter().flatten() {
                if dep == target {
                    return true;
                }
                if within.contains(dep) && seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        false
    }
}

/// Find the snapshot resource a reference points at
///
/// Exact matches win; otherwise an organization-level resource of the same
/// kind and name, otherwise the only resource with that kind and name.
fn lookup<'a>(
    dep: &ResourceRef,
    by_name: &BTreeMap<(ResourceKind, &str), Vec<&'a ResourceRef>>,
) -> Option<&'a ResourceRef> {
    let candidates = by_name.get(&(dep.kind, dep.name.as_str()))?;

    candidates
        .iter()
        .find(|c| **c == dep)
        .or_else(|| candidates.iter().find(|c| c.scope == Scope::Organization))
        .or_else(|| (candidates.len() == 1).then(|| &candidates[0]))
        .copied()
}

/// Resolve a snapshot into a migration order
///
/// Fails with [`CycleError`] naming every resource on a cycle when the
/// graph is not acyclic.
pub fn resolve(snapshot: &[ResourceNode]) -> Result<MigrationOrder, CycleError> {
    let graph = DependencyGraph::build(snapshot);
    let levels = graph.layers()?;

    log::debug!(
        "Resolved {} resources into {} levels",
        graph.len(),
        levels.len()
    );

    Ok(MigrationOrder {
        levels,
        warnings: graph.warnings,
    })
}

/// Keep only the nodes whose kind is in `kinds` (all when empty)
pub fn filter_kinds(snapshot: Vec<ResourceNode>, kinds: &[ResourceKind]) -> Vec<ResourceNode> {
    if kinds.is_empty() {
        return snapshot;
    }
    snapshot
        .into_iter()
        .filter(|n| kinds.contains(&n.kind()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(kind: ResourceKind, name: &str) -> ResourceNode {
        ResourceNode::new(ResourceRef::org(kind, name), json!({ "name": name }))
    }

    fn r(kind: ResourceKind, name: &str) -> ResourceRef {
        ResourceRef::org(kind, name)
    }

    /// Every resource once, every dependency in a strictly lower level
    fn assert_valid(order: &MigrationOrder, snapshot: &[ResourceNode]) {
        assert_eq!(order.total_resources(), snapshot.len());
        let graph = DependencyGraph::build(snapshot);
        for node in snapshot {
            let level = order.level_of(&node.reference).expect("resource placed");
            for dep in graph.dependencies(&node.reference).unwrap() {
                assert!(order.level_of(dep).unwrap() < level, "{dep} before {}", node.reference);
            }
        }
        for level in &order.levels {
            let mut sorted = level.clone();
            sorted.sort();
            assert_eq!(&sorted, level);
        }
    }

    #[test]
    fn test_target_server_before_proxy() {
        let snapshot = vec![
            node(ResourceKind::Proxy, "p1").depends_on(r(ResourceKind::TargetServer, "ts1")),
            node(ResourceKind::TargetServer, "ts1"),
        ];
        let order = resolve(&snapshot).unwrap();
        assert_eq!(
            order.levels,
            vec![
                vec![r(ResourceKind::TargetServer, "ts1")],
                vec![r(ResourceKind::Proxy, "p1")]
            ]
        );
        assert!(order.warnings.is_empty());
    }

    #[test]
    fn test_levels_sorted_by_kind_then_name() {
        let snapshot = vec![
            node(ResourceKind::Kvm, "b"),
            node(ResourceKind::TargetServer, "z"),
            node(ResourceKind::SharedFlow, "a"),
            node(ResourceKind::Kvm, "a"),
        ];
        let order = resolve(&snapshot).unwrap();
        assert_eq!(order.levels.len(), 1);
        assert_eq!(
            order.levels[0],
            vec![
                r(ResourceKind::SharedFlow, "a"),
                r(ResourceKind::TargetServer, "z"),
                r(ResourceKind::Kvm, "a"),
                r(ResourceKind::Kvm, "b"),
            ]
        );
    }

    #[test]
    fn test_kind_policy_products_follow_proxies() {
        let snapshot = vec![
            node(ResourceKind::Developer, "dev@example.com"),
            node(ResourceKind::ApiProduct, "gold"),
            node(ResourceKind::Proxy, "orders"),
        ];
        let order = resolve(&snapshot).unwrap();
        assert_eq!(order.levels[0], vec![r(ResourceKind::Proxy, "orders")]);
        assert_eq!(
            order.levels[1],
            vec![
                r(ResourceKind::ApiProduct, "gold"),
                r(ResourceKind::Developer, "dev@example.com"),
            ]
        );
        assert_valid(&order, &snapshot);
    }

    #[test]
    fn test_kind_policy_apps_follow_developers_and_products() {
        let snapshot = vec![
            node(ResourceKind::Developer, "dev@example.com"),
            node(ResourceKind::ApiProduct, "gold"),
            node(ResourceKind::DeveloperApp, "mobile"),
        ];
        let order = resolve(&snapshot).unwrap();
        assert_eq!(
            order.levels,
            vec![
                vec![
                    r(ResourceKind::ApiProduct, "gold"),
                    r(ResourceKind::Developer, "dev@example.com"),
                ],
                vec![r(ResourceKind::DeveloperApp, "mobile")],
            ]
        );
        assert_valid(&order, &snapshot);
    }

    #[test]
    fn test_kind_policy_proxies_follow_shared_flows() {
        // the callout names the policy, not the flow, so no edge is discovered
        let snapshot = vec![
            node(ResourceKind::Proxy, "billing")
                .depends_on(r(ResourceKind::SharedFlow, "FC-auth")),
            node(ResourceKind::SharedFlow, "auth"),
        ];
        let order = resolve(&snapshot).unwrap();
        assert_eq!(
            order.levels,
            vec![
                vec![r(ResourceKind::SharedFlow, "auth")],
                vec![r(ResourceKind::Proxy, "billing")],
            ]
        );
        assert_eq!(order.warnings.len(), 1);
    }

    #[test]
    fn test_app_finds_developer_by_id() {
        let developer = ResourceNode::new(
            r(ResourceKind::Developer, "dev@example.com"),
            json!({"email": "dev@example.com", "developerId": "abc123"}),
        );
        let app = node(ResourceKind::DeveloperApp, "mobile")
            .depends_on(r(ResourceKind::Developer, "abc123"));
        let order = resolve(&[app, developer]).unwrap();

        assert!(order.warnings.is_empty());
        assert_eq!(order.levels.len(), 2);
        assert_eq!(order.levels[0], vec![r(ResourceKind::Developer, "dev@example.com")]);
        assert_eq!(order.levels[1], vec![r(ResourceKind::DeveloperApp, "mobile")]);
    }

    #[test]
    fn test_leaf_kinds_ignore_references() {
        let snapshot = vec![
            node(ResourceKind::Proxy, "p1"),
            node(ResourceKind::TargetServer, "ts1").depends_on(r(ResourceKind::Proxy, "p1")),
        ];
        let order = resolve(&snapshot).unwrap();
        assert_eq!(order.levels.len(), 1);
        assert_eq!(order.warnings.len(), 1);
    }

    #[test]
    fn test_dangling_reference_is_warning() {
        let snapshot =
            vec![node(ResourceKind::Proxy, "p1").depends_on(r(ResourceKind::SharedFlow, "gone"))];
        let order = resolve(&snapshot).unwrap();
        assert_eq!(order.levels, vec![vec![r(ResourceKind::Proxy, "p1")]]);
        assert_eq!(order.warnings.len(), 1);
        assert!(order.warnings[0].contains("shared_flow/gone"));
    }

    #[test]
    fn test_reference_resolves_to_environment_resource() {
        let ts = ResourceNode::new(
            ResourceRef::env(ResourceKind::TargetServer, "ts1", "prod"),
            json!({"name": "ts1"}),
        );
        let proxy =
            node(ResourceKind::Proxy, "p1").depends_on(r(ResourceKind::TargetServer, "ts1"));
        let order = resolve(&[proxy, ts]).unwrap();
        assert_eq!(order.levels.len(), 2);
        assert!(order.warnings.is_empty());
    }

    #[test]
    fn test_cycle_reports_members_only() {
        let snapshot = vec![
            node(ResourceKind::SharedFlow, "a").depends_on(r(ResourceKind::SharedFlow, "b")),
            node(ResourceKind::SharedFlow, "b").depends_on(r(ResourceKind::SharedFlow, "a")),
            // depends on the cycle but is not part of it
            node(ResourceKind::Proxy, "p").depends_on(r(ResourceKind::SharedFlow, "a")),
            node(ResourceKind::TargetServer, "ts"),
        ];
        let err = resolve(&snapshot).unwrap_err();
        assert_eq!(
            err.members,
            vec![r(ResourceKind::SharedFlow, "a"), r(ResourceKind::SharedFlow, "b")]
        );
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let snapshot =
            vec![node(ResourceKind::SharedFlow, "loop").depends_on(r(ResourceKind::SharedFlow, "loop"))];
        let err = resolve(&snapshot).unwrap_err();
        assert_eq!(err.members, vec![r(ResourceKind::SharedFlow, "loop")]);
    }

    #[test]
    fn test_diamond_is_valid() {
        let snapshot = vec![
            node(ResourceKind::TargetServer, "ts"),
            node(ResourceKind::SharedFlow, "left").depends_on(r(ResourceKind::TargetServer, "ts")),
            node(ResourceKind::SharedFlow, "right").depends_on(r(ResourceKind::TargetServer, "ts")),
            node(ResourceKind::Proxy, "p")
                .depends_on(r(ResourceKind::SharedFlow, "left"))
                .depends_on(r(ResourceKind::SharedFlow, "right")),
            node(ResourceKind::ApiProduct, "prod"),
            node(ResourceKind::DeveloperApp, "app")
                .depends_on(r(ResourceKind::ApiProduct, "prod")),
        ];
        let order = resolve(&snapshot).unwrap();
        assert_valid(&order, &snapshot);
        assert_eq!(order.levels.len(), 5);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let mut snapshot = vec![
            node(ResourceKind::Proxy, "b"),
            node(ResourceKind::Proxy, "a"),
            node(ResourceKind::Kvm, "k"),
            node(ResourceKind::ApiProduct, "x"),
        ];
        let first = resolve(&snapshot).unwrap();
        snapshot.reverse();
        assert_eq!(resolve(&snapshot).unwrap(), first);
    }

    #[test]
    fn test_empty_snapshot() {
        let order = resolve(&[]).unwrap();
        assert!(order.is_empty());
        assert_eq!(order.total_resources(), 0);
    }

    #[test]
    fn test_filter_kinds() {
        let snapshot = vec![node(ResourceKind::Proxy, "p"), node(ResourceKind::Kvm, "k")];
        let filtered = filter_kinds(snapshot, &[ResourceKind::Kvm]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].kind(), ResourceKind::Kvm);
    }
}
