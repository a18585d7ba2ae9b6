// src/director/patch.rs

//! Patch applicability and requirement substitution
//!
//! A patch never mutates the units it targets. Applying patches yields a
//! [`PatchedUnit`] holding the effective requirement list used for
//! planning. Several patches compose in `(id, version)` order, each one
//! rewriting the output of the previous one.

use crate::metadata::{InstallableUnit, Requirement, UnitKey};
use std::sync::Arc;
use tracing::debug;

pub fn is_patch(unit: &InstallableUnit) -> bool {
    unit.is_patch()
}

/// Whether `patch` applies to `target`
///
/// The target must meet the lifecycle requirement and one of the scope
/// alternatives (each an AND list), and at least one change must rewrite a
/// requirement the target actually has, unless the change only adds. A
/// patch with no changes, or with only removals of requirements the target
/// lacks, never applies even when lifecycle and scope match.
pub fn is_applicable(patch: &InstallableUnit, target: &InstallableUnit) -> bool {
    let Some(details) = patch.patch.as_ref() else {
        return false;
    };
    if patch.key() == target.key() {
        return false;
    }
    if let Some(ref lifecycle) = details.lifecycle
        && !lifecycle.is_match(target)
    {
        return false;
    }
    if !details.applicability_scope.is_empty()
        && !details
            .applicability_scope
            .iter()
            .any(|all| all.iter().all(|req| req.is_match(target)))
    {
        return false;
    }
    details.changes.iter().any(|change| match change.from {
        None => change.to.is_some(),
        Some(_) => target.requirements.iter().any(|req| change.applies_to(req)),
    })
}

/// A unit viewed through the patches that apply to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedUnit {
    pub unit: Arc<InstallableUnit>,
    /// Keys of the patches applied, in application order
    pub applied: Vec<UnitKey>,
    /// Effective requirements after substitution
    pub requirements: Vec<Requirement>,
}

impl PatchedUnit {
    /// The unit with no patch applied
    pub fn unpatched(unit: Arc<InstallableUnit>) -> Self {
        let requirements = unit.requirements.clone();
        Self {
            unit,
            applied: Vec::new(),
            requirements,
        }
    }

    pub fn is_patched(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Apply every applicable patch in `patches` to `target`
pub fn apply(target: &Arc<InstallableUnit>, patches: &[Arc<InstallableUnit>]) -> PatchedUnit {
    let mut ordered: Vec<&Arc<InstallableUnit>> = patches
        .iter()
        .filter(|patch| is_applicable(patch, target))
        .collect();
    ordered.sort_by_key(|patch| patch.key());
    ordered.dedup_by_key(|patch| patch.key());

    let mut patched = PatchedUnit::unpatched(target.clone());
    for patch in ordered {
        let Some(details) = patch.patch.as_ref() else {
            continue;
        };
        for change in &details.changes {
            match (&change.from, &change.to) {
                (Some(_), to) => {
                    let mut rewritten = Vec::with_capacity(patched.requirements.len());
                    for req in patched.requirements.drain(..) {
                        if change.applies_to(&req) {
                            if let Some(to) = to
                                && !rewritten.contains(to)
                            {
                                rewritten.push(to.clone());
                            }
                        } else {
                            rewritten.push(req);
                        }
                    }
                    patched.requirements = rewritten;
                }
                (None, Some(to)) => {
                    if !patched.requirements.contains(to) {
                        patched.requirements.push(to.clone());
                    }
                }
                (None, None) => {}
            }
        }
        debug!("Applied patch {} to {}", patch.key(), target.key());
        patched.applied.push(patch.key());
    }
    patched
}
