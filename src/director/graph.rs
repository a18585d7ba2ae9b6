// src/director/graph.rs

//! Dependency graph over a unit set
//!
//! Used to order plan operands: installs run dependencies first, uninstalls
//! dependents first. Cycles are legal between units, so sorting never fails;
//! a cycle is broken at its smallest key.

use crate::metadata::{InstallableUnit, Requirement, UnitKey};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Directed graph: an edge `a -> b` means `a` requires something `b` provides
#[derive(Debug, Default)]
pub struct UnitGraph {
    nodes: BTreeSet<UnitKey>,
    edges: BTreeMap<UnitKey, BTreeSet<UnitKey>>,
    reverse_edges: BTreeMap<UnitKey, BTreeSet<UnitKey>>,
}

impl UnitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for `units`, reading each unit's requirements
    /// through `requirements_of`
    pub fn build<F>(units: &[Arc<InstallableUnit>], requirements_of: F) -> Self
    where
        F: Fn(&InstallableUnit) -> Vec<Requirement>,
    {
        let mut graph = Self::new();
        for unit in units {
            graph.add_node(unit.key());
        }
        for unit in units {
            for req in requirements_of(unit).iter() {
                for provider in units.iter().filter(|p| p.key() != unit.key()) {
                    if req.is_match(provider) {
                        graph.add_edge(unit.key(), provider.key());
                    }
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, key: UnitKey) {
        self.nodes.insert(key);
    }

    pub fn add_edge(&mut self, from: UnitKey, to: UnitKey) {
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        self.reverse_edges
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies(&self, key: &UnitKey) -> Vec<&UnitKey> {
        self.edges
            .get(key)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    pub fn dependents(&self, key: &UnitKey) -> Vec<&UnitKey> {
        self.reverse_edges
            .get(key)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Kahn's algorithm: dependencies before dependents, ties by key
    pub fn install_order(&self) -> Vec<UnitKey> {
        let mut remaining: BTreeMap<&UnitKey, usize> = self
            .nodes
            .iter()
            .map(|key| (key, self.edges.get(key).map_or(0, |deps| deps.len())))
            .collect();
        let mut ready: BTreeSet<&UnitKey> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(key, _)| *key)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while !remaining.is_empty() {
            let next = match ready.pop_first() {
                Some(key) => key,
                None => {
                    // Only cycles left; break at the smallest key
                    let Some((&key, _)) = remaining.iter().next() else {
                        break;
                    };
                    debug!("Breaking dependency cycle at {}", key);
                    key
                }
            };
            if remaining.remove(next).is_none() {
                continue;
            }
            result.push(next.clone());

            if let Some(dependents) = self.reverse_edges.get(next) {
                for dependent in dependents {
                    if let Some(degree) = remaining.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(dependent);
                        }
                    }
                }
            }
        }
        result
    }

    /// Dependents before dependencies
    pub fn uninstall_order(&self) -> Vec<UnitKey> {
        let mut order = self.install_order();
        order.reverse();
        order
    }

    /// Units on some cycle, if any
    pub fn detect_cycle(&self) -> Option<Vec<UnitKey>> {
        let mut visited = BTreeSet::new();
        let mut rec_stack = BTreeSet::new();
        let mut cycle = Vec::new();

        for key in &self.nodes {
            if !visited.contains(key)
                && self.dfs_cycle_detect(key, &mut visited, &mut rec_stack, &mut cycle)
            {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle_detect(
        &self,
        key: &UnitKey,
        visited: &mut BTreeSet<UnitKey>,
        rec_stack: &mut BTreeSet<UnitKey>,
        cycle: &mut Vec<UnitKey>,
    ) -> bool {
        visited.insert(key.clone());
        rec_stack.insert(key.clone());

        if let Some(deps) = self.edges.get(key) {
            for dep in deps {
                if !visited.contains(dep) {
                    if self.dfs_cycle_detect(dep, visited, rec_stack, cycle) {
                        cycle.push(key.clone());
                        return true;
                    }
                } else if rec_stack.contains(dep) {
                    cycle.push(dep.clone());
                    cycle.push(key.clone());
                    return true;
                }
            }
        }

        rec_stack.remove(key);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{Version, VersionRange};

    fn unit(id: &str, deps: &[&str]) -> Arc<InstallableUnit> {
        let mut builder = InstallableUnit::builder(id, Version::new(1, 0, 0));
        for dep in deps {
            builder = builder.requires(Requirement::unit(dep, VersionRange::any()));
        }
        Arc::new(builder.build().unwrap())
    }

    fn ids(keys: &[UnitKey]) -> Vec<&str> {
        keys.iter().map(|k| k.id.as_str()).collect()
    }

    #[test]
    fn test_install_order_dependencies_first() {
        let units = vec![unit("app", &["lib", "util"]), unit("lib", &["util"]), unit("util", &[])];
        let graph = UnitGraph::build(&units, |u| u.requirements.clone());
        assert_eq!(ids(&graph.install_order()), vec!["util", "lib", "app"]);
        assert_eq!(ids(&graph.uninstall_order()), vec!["app", "lib", "util"]);
        assert!(graph.detect_cycle().is_none());
        assert_eq!(graph.dependents(&units[2].key()).len(), 2);
    }

    #[test]
    fn test_cycle_does_not_lose_units() {
        let units = vec![unit("a", &["b"]), unit("b", &["a"]), unit("c", &["a"])];
        let graph = UnitGraph::build(&units, |u| u.requirements.clone());
        assert!(graph.detect_cycle().is_some());
        let order = graph.install_order();
        assert_eq!(order.len(), 3);
        assert_eq!(order.last().unwrap().id, "c");
    }
}
