// src/director/plan.rs

//! Provisioning plans and operand construction
//!
//! A plan is the difference between the basis profile and the solved future
//! unit set, expressed as ordered operands: uninstalls (dependents first),
//! installs (dependencies first), then property changes.

use super::graph::UnitGraph;
use super::request::ProfileChangeRequest;
use super::slicer::Slice;
use crate::metadata::{InstallableUnit, UnitKey};
use crate::profile::{PROP_ROOT, Profile};
use crate::status::Status;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Kind of an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Install,
    Uninstall,
    PropertyChange,
}

impl OperandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperandKind::Install => "INSTALL",
            OperandKind::Uninstall => "UNINSTALL",
            OperandKind::PropertyChange => "PROPERTY_CHANGE",
        }
    }
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Install `unit`; `replaces` links an update to the unit it supersedes
    Install {
        unit: Arc<InstallableUnit>,
        replaces: Option<UnitKey>,
    },
    Uninstall {
        unit: Arc<InstallableUnit>,
    },
    /// Change a unit property; `None` means absent
    UnitProperty {
        key: UnitKey,
        name: String,
        before: Option<String>,
        after: Option<String>,
    },
    ProfileProperty {
        name: String,
        before: Option<String>,
        after: Option<String>,
    },
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Install { .. } => OperandKind::Install,
            Operand::Uninstall { .. } => OperandKind::Uninstall,
            Operand::UnitProperty { .. } | Operand::ProfileProperty { .. } => {
                OperandKind::PropertyChange
            }
        }
    }

    /// The unit an install or uninstall operand acts on
    pub fn unit(&self) -> Option<&Arc<InstallableUnit>> {
        match self {
            Operand::Install { unit, .. } | Operand::Uninstall { unit } => Some(unit),
            _ => None,
        }
    }
}

fn show(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<none>")
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Install {
                unit,
                replaces: Some(old),
            } => write!(f, "install {} (replaces {})", unit.key(), old),
            Operand::Install { unit, replaces: None } => write!(f, "install {}", unit.key()),
            Operand::Uninstall { unit } => write!(f, "uninstall {}", unit.key()),
            Operand::UnitProperty {
                key,
                name,
                before,
                after,
            } => write!(f, "property {} {}: {} -> {}", key, name, show(before), show(after)),
            Operand::ProfileProperty {
                name,
                before,
                after,
            } => write!(f, "profile property {}: {} -> {}", name, show(before), show(after)),
        }
    }
}

/// Planner output
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub profile_id: String,
    /// Timestamp of the profile revision the plan was computed against
    pub basis_timestamp: i64,
    pub status: Status,
    pub operands: Vec<Operand>,
    /// Unit set the profile will hold after the plan runs, in key order
    pub future: Vec<Arc<InstallableUnit>>,
}

impl ProvisioningPlan {
    /// A plan with no operands carrying a failure or cancellation status
    pub fn failed(profile: &Profile, status: Status) -> Self {
        Self {
            profile_id: profile.id().to_string(),
            basis_timestamp: profile.timestamp(),
            status,
            operands: Vec::new(),
            future: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    pub fn installs(&self) -> impl Iterator<Item = &Operand> {
        self.operands
            .iter()
            .filter(|op| op.kind() == OperandKind::Install)
    }

    pub fn uninstalls(&self) -> impl Iterator<Item = &Operand> {
        self.operands
            .iter()
            .filter(|op| op.kind() == OperandKind::Uninstall)
    }
}

/// Compute ordered operands turning `profile` into `future`
///
/// `roots` are the keys the request added; they get the root marker.
/// Replacements inherit the unit properties of the unit they replace.
pub fn compute_operands(
    profile: &Profile,
    future: &[Arc<InstallableUnit>],
    roots: &BTreeSet<UnitKey>,
    request: &ProfileChangeRequest,
    slice: &Slice,
) -> Vec<Operand> {
    let future_keys: BTreeSet<UnitKey> = future.iter().map(|u| u.key()).collect();
    let removed: Vec<&Arc<InstallableUnit>> = profile
        .units()
        .filter(|u| !future_keys.contains(&u.key()))
        .collect();
    let added: BTreeSet<UnitKey> = future
        .iter()
        .map(|u| u.key())
        .filter(|key| !profile.contains(key))
        .collect();

    // Each removed unit is claimed by at most one same-id addition
    let mut replaces: BTreeMap<UnitKey, UnitKey> = BTreeMap::new();
    let mut claimed: BTreeSet<UnitKey> = BTreeSet::new();
    for key in &added {
        if let Some(old) = removed
            .iter()
            .map(|u| u.key())
            .filter(|old| old.id == key.id && !claimed.contains(old))
            .max_by(|a, b| a.version.cmp(&b.version))
        {
            claimed.insert(old.clone());
            replaces.insert(key.clone(), old);
        }
    }

    let mut operands = Vec::new();

    let installed: Vec<Arc<InstallableUnit>> = profile.units().cloned().collect();
    let old_graph = UnitGraph::build(&installed, |u| u.requirements.clone());
    for key in old_graph.uninstall_order() {
        if future_keys.contains(&key) {
            continue;
        }
        if let Some(unit) = profile.unit(&key) {
            operands.push(Operand::Uninstall { unit: unit.clone() });
        }
    }

    let new_graph = UnitGraph::build(future, |u| slice.requirements(&u.key()).to_vec());
    let by_key: BTreeMap<UnitKey, &Arc<InstallableUnit>> =
        future.iter().map(|u| (u.key(), u)).collect();
    for key in new_graph.install_order() {
        if !added.contains(&key) {
            continue;
        }
        if let Some(unit) = by_key.get(&key) {
            operands.push(Operand::Install {
                unit: (*unit).clone(),
                replaces: replaces.get(&key).cloned(),
            });
        }
    }

    for key in &future_keys {
        let before: BTreeMap<String, String> =
            profile.unit_properties(key).cloned().unwrap_or_default();
        let mut after = match replaces.get(key) {
            Some(old) => profile.unit_properties(old).cloned().unwrap_or_default(),
            None => before.clone(),
        };
        if roots.contains(key) {
            after.insert(PROP_ROOT.to_string(), "true".to_string());
        }
        if let Some(changes) = request.unit_property_changes().get(key) {
            for (name, value) in changes {
                match value {
                    Some(value) => after.insert(name.clone(), value.clone()),
                    None => after.remove(name),
                };
            }
        }

        let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        for name in names {
            let old = before.get(name);
            let new = after.get(name);
            if old != new {
                operands.push(Operand::UnitProperty {
                    key: key.clone(),
                    name: name.clone(),
                    before: old.cloned(),
                    after: new.cloned(),
                });
            }
        }
    }

    for (name, value) in request.profile_property_changes() {
        let before = profile.property(name).map(str::to_string);
        if before != *value {
            operands.push(Operand::ProfileProperty {
                name: name.clone(),
                before,
                after: value.clone(),
            });
        }
    }

    operands
}
