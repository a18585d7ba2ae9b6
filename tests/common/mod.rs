// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use provisioner::director::ProvisioningContext;
use provisioner::metadata::{
    InstallableUnit, PatchDetails, Requirement, RequirementChange, UnitBuilder, UpdateDescriptor,
};
use provisioner::profile::{LockFlags, PROP_LOCK, PROP_ROOT, Profile};
use provisioner::repository::MemoryRepository;
use provisioner::{Version, VersionRange};
use std::sync::Arc;

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub fn range(s: &str) -> VersionRange {
    VersionRange::parse(s).unwrap()
}

pub fn builder(id: &str, version: &str) -> UnitBuilder {
    InstallableUnit::builder(id, v(version))
}

/// A unit with no requirements
pub fn unit(id: &str, version: &str) -> Arc<InstallableUnit> {
    Arc::new(builder(id, version).build().unwrap())
}

/// A unit requiring other units by id and range
pub fn requiring(id: &str, version: &str, deps: &[(&str, &str)]) -> Arc<InstallableUnit> {
    let mut b = builder(id, version);
    for (dep, dep_range) in deps {
        b = b.requires(Requirement::unit(dep, range(dep_range)));
    }
    Arc::new(b.build().unwrap())
}

/// A unit declaring itself an update of `target` in `target_range`
pub fn update_of(id: &str, version: &str, target: &str, target_range: &str) -> Arc<InstallableUnit> {
    Arc::new(
        builder(id, version)
            .update_descriptor(UpdateDescriptor::new(target, range(target_range)))
            .build()
            .unwrap(),
    )
}

/// Patch details rewriting requirement `from` into `to` on units in scope
pub fn patch_details(
    from: (&str, &str),
    to: (&str, &str),
    scope: &str,
    lifecycle: Option<(&str, &str)>,
) -> PatchDetails {
    PatchDetails {
        changes: vec![RequirementChange::new(
            Some(Requirement::unit(from.0, range(from.1))),
            Some(Requirement::unit(to.0, range(to.1))),
        )],
        applicability_scope: vec![vec![Requirement::unit(scope, VersionRange::any())]],
        lifecycle: lifecycle.map(|(id, r)| Requirement::unit(id, range(r))),
    }
}

/// Context serving `units` from one in-memory repository
pub fn context(units: &[Arc<InstallableUnit>]) -> ProvisioningContext {
    let repo = MemoryRepository::with_units("test", units.iter().map(|u| u.as_ref().clone()));
    ProvisioningContext::new().with_repository(Arc::new(repo))
}

/// A profile revision holding `roots` (marked root) and `others`
pub fn profile_with(
    id: &str,
    roots: &[Arc<InstallableUnit>],
    others: &[Arc<InstallableUnit>],
) -> Arc<Profile> {
    let mut working = Profile::empty(id).working_copy();
    for unit in roots {
        working.add_unit(unit.clone());
        working.set_unit_property(&unit.key(), PROP_ROOT, "true");
    }
    for unit in others {
        working.add_unit(unit.clone());
    }
    Arc::new(working.build(1))
}

/// Copy of `profile` with `flags` set on one unit
pub fn with_lock(profile: &Profile, unit: &InstallableUnit, flags: LockFlags) -> Arc<Profile> {
    let mut working = profile.working_copy();
    working.set_unit_property(&unit.key(), PROP_LOCK, &flags.bits().to_string());
    Arc::new(working.build(profile.timestamp() + 1))
}
