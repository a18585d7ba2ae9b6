// src/query/collection.rs

//! Indexed, immutable-after-build unit pool

use super::Query;
use crate::error::{Error, Result};
use crate::metadata::{InstallableUnit, Requirement, UnitKey};
use crate::progress::ProgressMonitor;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

/// Query results, sorted by unit key
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    units: Vec<Arc<InstallableUnit>>,
}

impl QueryResult {
    pub fn new(mut units: Vec<Arc<InstallableUnit>>) -> Self {
        units.sort_by_key(|u| u.key());
        units.dedup_by_key(|u| u.key());
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.units.iter()
    }

    pub fn keys(&self) -> Vec<UnitKey> {
        self.units.iter().map(|u| u.key()).collect()
    }

    pub fn into_vec(self) -> Vec<Arc<InstallableUnit>> {
        self.units
    }
}

impl IntoIterator for QueryResult {
    type Item = Arc<InstallableUnit>;
    type IntoIter = std::vec::IntoIter<Arc<InstallableUnit>>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.into_iter()
    }
}

/// A unit pool indexed by key, id, and provided capability
#[derive(Debug, Clone, Default)]
pub struct IuCollection {
    units: BTreeMap<UnitKey, Arc<InstallableUnit>>,
    by_id: BTreeMap<String, BTreeSet<UnitKey>>,
    by_capability: BTreeMap<(String, String), BTreeSet<UnitKey>>,
}

impl IuCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_units<I>(units: I) -> Self
    where
        I: IntoIterator<Item = Arc<InstallableUnit>>,
    {
        let mut collection = Self::new();
        for unit in units {
            collection.insert(unit);
        }
        collection
    }

    /// Add a unit; the first unit seen for a key wins
    ///
    /// Returns false when the key was already present.
    pub fn insert(&mut self, unit: Arc<InstallableUnit>) -> bool {
        let key = unit.key();
        if let Some(existing) = self.units.get(&key) {
            if **existing != *unit {
                warn!("Ignoring unit {} with conflicting content for an existing key", key);
            }
            return false;
        }
        self.by_id
            .entry(unit.id.clone())
            .or_default()
            .insert(key.clone());
        for cap in &unit.provided {
            self.by_capability
                .entry((cap.namespace.clone(), cap.name.clone()))
                .or_default()
                .insert(key.clone());
        }
        self.units.insert(key, unit);
        true
    }

    pub fn get(&self, key: &UnitKey) -> Option<&Arc<InstallableUnit>> {
        self.units.get(key)
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.units.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units in key order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.units.values()
    }

    /// All versions of an id, ascending
    pub fn versions_of(&self, id: &str) -> Vec<Arc<InstallableUnit>> {
        self.by_id
            .get(id)
            .map(|keys| keys.iter().filter_map(|k| self.units.get(k).cloned()).collect())
            .unwrap_or_default()
    }

    /// Every unit with a capability satisfying `requirement`, in key order
    pub fn providers(&self, requirement: &Requirement) -> Vec<Arc<InstallableUnit>> {
        let index_key = (requirement.namespace.clone(), requirement.name.clone());
        self.by_capability
            .get(&index_key)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.units.get(k))
                    .filter(|unit| requirement.is_match(unit))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run a query, polling `monitor` once per candidate
    pub fn query(&self, query: &Query, monitor: &dyn ProgressMonitor) -> Result<QueryResult> {
        let candidates: Vec<&Arc<InstallableUnit>> = match query {
            Query::Key(key) => self.units.get(key).into_iter().collect(),
            Query::Id(id) | Query::IdRange(id, _) => self
                .by_id
                .get(id)
                .map(|keys| keys.iter().filter_map(|k| self.units.get(k)).collect())
                .unwrap_or_default(),
            Query::Capability(req) => self
                .by_capability
                .get(&(req.namespace.clone(), req.name.clone()))
                .map(|keys| keys.iter().filter_map(|k| self.units.get(k)).collect())
                .unwrap_or_default(),
            _ => self.units.values().collect(),
        };

        let mut admitted = Vec::with_capacity(candidates.len());
        for unit in candidates {
            if monitor.is_cancelled() {
                return Err(Error::Cancelled(format!("query {:?}", query)));
            }
            admitted.push(unit);
        }
        Ok(QueryResult::new(query.perform(admitted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ProvidedCapability;
    use crate::progress::{CancelToken, NullMonitor};
    use crate::version::{Version, VersionRange};

    fn unit(id: &str, version: &str) -> Arc<InstallableUnit> {
        Arc::new(
            InstallableUnit::builder(id, Version::parse(version).unwrap())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_first_insert_wins() {
        let mut pool = IuCollection::new();
        let first = Arc::new(
            InstallableUnit::builder("p", Version::new(1, 0, 0))
                .property("origin", "first")
                .build()
                .unwrap(),
        );
        let second = Arc::new(
            InstallableUnit::builder("p", Version::new(1, 0, 0))
                .property("origin", "second")
                .build()
                .unwrap(),
        );
        assert!(pool.insert(first));
        assert!(!pool.insert(second));
        let key = UnitKey::new("p", Version::new(1, 0, 0));
        assert_eq!(pool.get(&key).unwrap().property("origin"), Some("first"));
    }

    #[test]
    fn test_providers_by_capability() {
        let provider = Arc::new(
            InstallableUnit::builder("impl", Version::new(2, 0, 0))
                .provides(ProvidedCapability::new("service", "log", Version::new(1, 5, 0)))
                .build()
                .unwrap(),
        );
        let pool = IuCollection::from_units(vec![provider, unit("other", "1.0")]);
        let req = Requirement::new("service", "log", VersionRange::parse("[1.0,2.0)").unwrap());
        let found = pool.providers(&req);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "impl");
        let miss = Requirement::new("service", "log", VersionRange::parse("[2.0,3.0)").unwrap());
        assert!(pool.providers(&miss).is_empty());
    }

    #[test]
    fn test_query_honours_cancellation() {
        let pool = IuCollection::from_units(vec![unit("a", "1.0"), unit("b", "1.0")]);
        let token = CancelToken::new();
        let monitor = NullMonitor::with_token(token.clone());
        assert_eq!(pool.query(&Query::All, &monitor).unwrap().len(), 2);
        token.cancel();
        assert!(matches!(
            pool.query(&Query::All, &monitor),
            Err(Error::Cancelled(_))
        ));
    }

    #[test]
    fn test_versions_of_ascending() {
        let pool = IuCollection::from_units(vec![unit("a", "2.0"), unit("a", "1.0")]);
        let versions: Vec<String> = pool.versions_of("a").iter().map(|u| u.version.to_string()).collect();
        assert_eq!(versions, vec!["1.0.0", "2.0.0"]);
    }
}
