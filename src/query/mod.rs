// src/query/mod.rs

//! Unit queries
//!
//! A [`Query`] is a tagged value rather than a trait hierarchy. Most variants
//! are per-unit predicates; `Latest` filters a whole result set, and
//! `Predicate` is the escape hatch for ad-hoc closures.

mod collection;

pub use collection::{IuCollection, QueryResult};

use crate::metadata::{InstallableUnit, Requirement, UnitKey};
use crate::version::VersionRange;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Boxed predicate over a unit
pub type UnitPredicate = Arc<dyn Fn(&InstallableUnit) -> bool + Send + Sync>;

/// A composable unit query
#[derive(Clone)]
pub enum Query {
    All,
    Id(String),
    IdRange(String, VersionRange),
    Key(UnitKey),
    /// Units providing a capability that satisfies the requirement
    Capability(Requirement),
    /// Units with a property; `None` matches any value
    Property {
        name: String,
        value: Option<String>,
    },
    Patches,
    /// Updates of the given unit, including patches whose lifecycle it meets
    UpdatesOf(Arc<InstallableUnit>),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
    /// Keep only the highest version per id among the inner matches;
    /// the reduction applies at the top level of a query
    Latest(Box<Query>),
    Predicate(UnitPredicate),
}

impl Query {
    pub fn id(id: &str) -> Self {
        Query::Id(id.to_string())
    }

    pub fn id_range(id: &str, range: VersionRange) -> Self {
        Query::IdRange(id.to_string(), range)
    }

    pub fn property(name: &str, value: Option<&str>) -> Self {
        Query::Property {
            name: name.to_string(),
            value: value.map(str::to_string),
        }
    }

    pub fn updates_of(unit: Arc<InstallableUnit>) -> Self {
        Query::UpdatesOf(unit)
    }

    pub fn latest(inner: Query) -> Self {
        Query::Latest(Box::new(inner))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&InstallableUnit) -> bool + Send + Sync + 'static,
    {
        Query::Predicate(Arc::new(f))
    }

    /// Evaluate the per-unit part of the query
    ///
    /// `Latest` is treated as its inner query here; [`Query::perform`]
    /// applies the set-level reduction.
    pub fn is_match(&self, unit: &InstallableUnit) -> bool {
        match self {
            Query::All => true,
            Query::Id(id) => unit.id == *id,
            Query::IdRange(id, range) => unit.id == *id && range.contains(&unit.version),
            Query::Key(key) => unit.id == key.id && unit.version == key.version,
            Query::Capability(req) => req.is_match(unit),
            Query::Property { name, value } => match (unit.property(name), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Query::Patches => unit.is_patch(),
            Query::UpdatesOf(from) => is_update(from, unit),
            Query::And(items) => items.iter().all(|q| q.is_match(unit)),
            Query::Or(items) => items.iter().any(|q| q.is_match(unit)),
            Query::Not(inner) => !inner.is_match(unit),
            Query::Latest(inner) => inner.is_match(unit),
            Query::Predicate(f) => f(unit),
        }
    }

    /// Run the query over candidates, returning matches sorted by key
    pub fn perform<'a, I>(&self, candidates: I) -> Vec<Arc<InstallableUnit>>
    where
        I: IntoIterator<Item = &'a Arc<InstallableUnit>>,
    {
        let mut matched: Vec<Arc<InstallableUnit>> = candidates
            .into_iter()
            .filter(|unit| self.is_match(unit))
            .cloned()
            .collect();

        if let Query::Latest(_) = self {
            let mut best: BTreeMap<String, Arc<InstallableUnit>> = BTreeMap::new();
            for unit in matched {
                match best.get(&unit.id) {
                    Some(existing) if existing.version >= unit.version => {}
                    _ => {
                        best.insert(unit.id.clone(), unit);
                    }
                }
            }
            matched = best.into_values().collect();
        }

        matched.sort_by_key(|unit| unit.key());
        matched.dedup_by_key(|unit| unit.key());
        matched
    }
}

/// Update relation between an installed unit and a candidate
///
/// A patch is an update of a non-patch unit when its lifecycle requirement
/// is present and met by that unit. Otherwise the candidate's update
/// descriptor must cover `from` and the candidate must be strictly newer.
pub fn is_update(from: &InstallableUnit, candidate: &InstallableUnit) -> bool {
    if candidate.is_patch() && !from.is_patch() {
        return candidate
            .patch
            .as_ref()
            .and_then(|details| details.lifecycle.as_ref())
            .is_some_and(|lifecycle| lifecycle.is_match(from));
    }
    candidate
        .update_descriptor
        .as_ref()
        .is_some_and(|descriptor| descriptor.is_update_of(from))
        && from.version < candidate.version
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::All => write!(f, "All"),
            Query::Id(id) => write!(f, "Id({})", id),
            Query::IdRange(id, range) => write!(f, "IdRange({}, {})", id, range),
            Query::Key(key) => write!(f, "Key({})", key),
            Query::Capability(req) => write!(f, "Capability({})", req),
            Query::Property { name, value } => write!(f, "Property({}, {:?})", name, value),
            Query::Patches => write!(f, "Patches"),
            Query::UpdatesOf(unit) => write!(f, "UpdatesOf({})", unit),
            Query::And(items) => f.debug_tuple("And").field(items).finish(),
            Query::Or(items) => f.debug_tuple("Or").field(items).finish(),
            Query::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Query::Latest(inner) => f.debug_tuple("Latest").field(inner).finish(),
            Query::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PatchDetails, UpdateDescriptor};
    use crate::version::Version;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn unit(id: &str, version: &str) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::builder(id, v(version)).build().unwrap())
    }

    #[test]
    fn test_id_and_range() {
        let units = vec![unit("a", "1.0"), unit("a", "2.0"), unit("b", "1.0")];
        assert_eq!(Query::id("a").perform(&units).len(), 2);
        let ranged = Query::id_range("a", VersionRange::parse("[1.5,3.0)").unwrap()).perform(&units);
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].version, v("2.0"));
    }

    #[test]
    fn test_latest_keeps_highest_per_id() {
        let units = vec![unit("a", "1.0"), unit("a", "2.0"), unit("b", "1.0")];
        let latest = Query::latest(Query::All).perform(&units);
        let keys: Vec<String> = latest.iter().map(|u| u.key().to_string()).collect();
        assert_eq!(keys, vec!["a@2.0.0", "b@1.0.0"]);
    }

    #[test]
    fn test_boolean_and_predicate() {
        let units = vec![unit("a", "1.0"), unit("b", "1.0"), unit("c", "3.0")];
        let q = Query::Or(vec![
            Query::id("a"),
            Query::And(vec![
                Query::Not(Box::new(Query::id("b"))),
                Query::predicate(|u| u.version.major() >= 3),
            ]),
        ]);
        let ids: Vec<String> = q.perform(&units).iter().map(|u| u.id.clone()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_update_requires_strictly_newer() {
        let from = InstallableUnit::builder("a", v("1.0")).build().unwrap();
        let same_version = InstallableUnit::builder("a", v("1.0"))
            .update_descriptor(UpdateDescriptor::new("a", VersionRange::any()))
            .build()
            .unwrap();
        let newer = InstallableUnit::builder("a2", v("1.5"))
            .update_descriptor(UpdateDescriptor::new("a", VersionRange::parse("[1.0,1.0]").unwrap()))
            .build()
            .unwrap();
        assert!(!is_update(&from, &same_version));
        assert!(is_update(&from, &newer));
    }

    #[test]
    fn test_patch_update_uses_lifecycle() {
        let from = InstallableUnit::builder("a", v("1.0")).build().unwrap();
        let with_lifecycle = InstallableUnit::builder("p", v("1.0"))
            .patch(PatchDetails {
                lifecycle: Some(Requirement::unit("a", VersionRange::any())),
                ..Default::default()
            })
            .build()
            .unwrap();
        let without_lifecycle = InstallableUnit::builder("q", v("1.0"))
            .patch(PatchDetails::default())
            .build()
            .unwrap();
        assert!(is_update(&from, &with_lifecycle));
        assert!(!is_update(&from, &without_lifecycle));
    }
}
