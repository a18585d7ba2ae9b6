// src/director/slicer.rs

//! Candidate pool assembly
//!
//! Starting from the seed units, walk requirements breadth first and pull
//! in every unit from the context that could satisfy one. Each unit's
//! requirements are read through the active patches, and requirements whose
//! applicability filter is false in the environment are dropped here, so
//! the solver only ever sees effective, applicable requirements.

use super::context::ProvisioningContext;
use super::patch::{self, PatchedUnit};
use crate::error::{Error, Result};
use crate::metadata::{InstallableUnit, Requirement, UnitKey};
use crate::progress::ProgressMonitor;
use crate::query::{IuCollection, Query};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// The candidate pool and each candidate's effective requirements
#[derive(Debug, Clone, Default)]
pub struct Slice {
    pub pool: IuCollection,
    pub units: BTreeMap<UnitKey, PatchedUnit>,
}

impl Slice {
    /// Effective, applicable requirements of a pooled unit
    pub fn requirements(&self, key: &UnitKey) -> &[Requirement] {
        self.units
            .get(key)
            .map(|p| p.requirements.as_slice())
            .unwrap_or(&[])
    }
}

/// Build the pool for `seeds`
///
/// Seeds are inserted first, so their content wins over a repository unit
/// with the same key. Polls `monitor` once per candidate; cancellation is
/// reported as [`Error::Cancelled`].
pub fn slice(
    seeds: &[Arc<InstallableUnit>],
    patches: &[Arc<InstallableUnit>],
    context: &ProvisioningContext,
    monitor: &dyn ProgressMonitor,
) -> Result<Slice> {
    let mut slice = Slice::default();
    let mut queue: VecDeque<Arc<InstallableUnit>> = VecDeque::new();
    let mut provider_cache: HashMap<Requirement, Vec<Arc<InstallableUnit>>> = HashMap::new();

    for seed in seeds {
        if slice.pool.insert(seed.clone()) {
            queue.push_back(seed.clone());
        }
    }

    while let Some(unit) = queue.pop_front() {
        if monitor.is_cancelled() {
            return Err(Error::Cancelled("assembling candidate pool".to_string()));
        }
        monitor.set_message(&format!("Slicing {}", unit.key()));

        let mut patched = patch::apply(&unit, patches);
        patched
            .requirements
            .retain(|req| req.is_applicable(context.environment()));

        for req in &patched.requirements {
            // Non-greedy optionals are only met by units pulled in elsewhere
            if req.is_optional() && !req.greedy {
                continue;
            }
            let providers = match provider_cache.get(req) {
                Some(found) => found.clone(),
                None => {
                    let found = context
                        .query(&Query::Capability(req.clone()), monitor)?
                        .into_vec();
                    provider_cache.insert(req.clone(), found.clone());
                    found
                }
            };
            for provider in providers {
                if slice.pool.insert(provider.clone()) {
                    queue.push_back(provider);
                }
            }
        }
        monitor.worked(1);
        slice.units.insert(unit.key(), patched);
    }

    debug!("Candidate pool holds {} units", slice.pool.len());
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Filter;
    use crate::progress::{CancelToken, NullMonitor};
    use crate::repository::MemoryRepository;
    use crate::version::{Version, VersionRange};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn context() -> ProvisioningContext {
        let b = InstallableUnit::builder("b", v("1.0.0"))
            .requires(Requirement::unit("c", VersionRange::any()))
            .build()
            .unwrap();
        let c = InstallableUnit::builder("c", v("1.0.0")).build().unwrap();
        let win = InstallableUnit::builder("win", v("1.0.0")).build().unwrap();
        let unrelated = InstallableUnit::builder("z", v("1.0.0")).build().unwrap();
        ProvisioningContext::new()
            .with_repository(Arc::new(MemoryRepository::with_units("r", vec![b, c, win, unrelated])))
            .with_property("os", "linux")
    }

    fn root() -> Arc<InstallableUnit> {
        Arc::new(
            InstallableUnit::builder("a", v("1.0.0"))
                .requires(Requirement::unit("b", VersionRange::any()))
                .requires(
                    Requirement::unit("win", VersionRange::any())
                        .with_filter(Filter::parse("(os=win32)").unwrap()),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_transitive_closure_respects_environment() {
        let slice = slice(&[root()], &[], &context(), &NullMonitor::new()).unwrap();
        let ids: Vec<String> = slice.pool.iter().map(|u| u.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(slice.requirements(&root().key()).len(), 1);
    }

    #[test]
    fn test_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let monitor = NullMonitor::with_token(token);
        assert!(matches!(
            slice(&[root()], &[], &context(), &monitor),
            Err(Error::Cancelled(_))
        ));
    }
}
