// src/director/mod.rs

//! Planning: from a change request to an ordered provisioning plan
//!
//! The [`Planner`] walks four states for every request:
//!
//! 1. `RequestReceived`: locks are checked and the request is normalized
//! 2. `CandidatePoolAssembled`: the slicer gathers candidates through the
//!    active patches
//! 3. `ConstraintSolving`: the backtracking solver picks a consistent set
//! 4. `PlanOrError`: operands are computed, or the failure is reported
//!
//! Planning never fails for domain reasons: an unsatisfiable request gives a
//! plan whose status is ERROR and which carries no operands. Only
//! infrastructure failures (a repository that cannot be read) are `Err`.
//!
//! The [`Director`] chains a planner and an engine.

pub mod context;
pub mod graph;
pub mod patch;
pub mod plan;
pub mod request;
pub mod slicer;
pub mod solver;
pub mod updates;

pub use context::ProvisioningContext;
pub use plan::{Operand, OperandKind, ProvisioningPlan};
pub use request::ProfileChangeRequest;

use crate::engine::{Engine, PhaseSet};
use crate::error::{Error, Result};
use crate::metadata::{InstallableUnit, UnitKey};
use crate::profile::LockFlags;
use crate::progress::ProgressMonitor;
use crate::status::{Problem, Status};
use solver::{Constraints, DEFAULT_SEARCH_LIMIT, Resolution, Solver};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Planner lifecycle for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    RequestReceived,
    CandidatePoolAssembled,
    ConstraintSolving,
    PlanOrError,
}

impl fmt::Display for PlannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlannerState::RequestReceived => "request-received",
            PlannerState::CandidatePoolAssembled => "candidate-pool-assembled",
            PlannerState::ConstraintSolving => "constraint-solving",
            PlannerState::PlanOrError => "plan-or-error",
        };
        f.write_str(name)
    }
}

fn enter(profile_id: &str, state: PlannerState) {
    debug!("Planner [{}]: {}", profile_id, state);
}

/// Request after lock enforcement
struct Normalized {
    additions: Vec<Arc<InstallableUnit>>,
    optional: Vec<Arc<InstallableUnit>>,
    removals: BTreeSet<UnitKey>,
    warnings: Vec<Problem>,
}

/// Computes provisioning plans
#[derive(Debug, Clone)]
pub struct Planner {
    search_limit: usize,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    pub fn new() -> Self {
        Self {
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_search_limit(search_limit: usize) -> Self {
        Self { search_limit }
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    /// Units in the context that update `unit`
    pub fn updates_for(
        &self,
        unit: &Arc<InstallableUnit>,
        context: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<Arc<InstallableUnit>>> {
        updates::updates_for(unit, context, monitor)
    }

    /// Compute the plan for `request`
    ///
    /// Identical inputs always give identical operands and status.
    pub fn get_provisioning_plan(
        &self,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Result<ProvisioningPlan> {
        let profile = request.profile();
        let profile_id = profile.id().to_string();
        enter(&profile_id, PlannerState::RequestReceived);
        monitor.begin_task(&format!("Planning changes to {}", profile_id), 100);

        let normalized = normalize(request);
        let mut lock_status = Status::multi("Locks");
        for problem in &normalized.warnings {
            warn!("{}", problem);
            lock_status.add(Status::from_problem(problem.clone()));
        }

        let kept: Vec<Arc<InstallableUnit>> = profile
            .units()
            .filter(|u| !normalized.removals.contains(&u.key()))
            .cloned()
            .collect();

        let mut mandatory = normalized.additions.clone();
        for unit in &kept {
            let key = unit.key();
            if profile.is_root(&key) || profile.lock_flags(&key).contains(LockFlags::UNINSTALL) {
                mandatory.push(unit.clone());
            }
        }

        let patches: Vec<Arc<InstallableUnit>> = kept
            .iter()
            .chain(&normalized.additions)
            .chain(&normalized.optional)
            .filter(|u| patch::is_patch(u))
            .cloned()
            .collect();

        let mut seeds = normalized.additions.clone();
        seeds.extend(normalized.optional.iter().cloned());
        seeds.extend(kept.iter().cloned());

        let slice = {
            let pool_monitor = crate::progress::SubMonitor::new(monitor, 40);
            match slicer::slice(&seeds, &patches, context, &pool_monitor) {
                Ok(slice) => {
                    pool_monitor.done();
                    slice
                }
                Err(Error::Cancelled(_)) => return Ok(cancelled(profile, &profile_id)),
                Err(e) => return Err(e),
            }
        };
        enter(&profile_id, PlannerState::CandidatePoolAssembled);

        let mut constraints = Constraints {
            mandatory,
            optional: normalized.optional.clone(),
            installed: profile.units().map(|u| u.key()).collect(),
            forbidden: normalized.removals.clone(),
            ..Default::default()
        };
        for unit in profile.units() {
            let key = unit.key();
            if profile.lock_flags(&key).contains(LockFlags::UPDATE) {
                constraints.pinned.insert(unit.id.clone(), key);
            }
        }

        enter(&profile_id, PlannerState::ConstraintSolving);
        let resolution = match Solver::new(&slice, self.search_limit, monitor).solve(&constraints) {
            Ok(resolution) => resolution,
            Err(Error::Cancelled(_)) => return Ok(cancelled(profile, &profile_id)),
            Err(e) => return Err(e),
        };
        monitor.worked(40);

        enter(&profile_id, PlannerState::PlanOrError);
        let mut status = Status::multi(format!("Plan for profile {}", profile_id));
        status.merge(lock_status);

        let plan = match resolution {
            Resolution::Unsatisfiable(failure) => {
                status.merge(failure);
                info!("No plan for profile {}: request cannot be satisfied", profile_id);
                ProvisioningPlan::failed(profile, status)
            }
            Resolution::Solved { units, status: solved } => {
                status.merge(solved);
                let roots: BTreeSet<UnitKey> = normalized
                    .additions
                    .iter()
                    .chain(&normalized.optional)
                    .map(|u| u.key())
                    .filter(|key| units.iter().any(|u| u.key() == *key))
                    .collect();
                let operands = plan::compute_operands(profile, &units, &roots, request, &slice);
                info!(
                    "Plan for profile {}: {} operand(s), status {}",
                    profile_id,
                    operands.len(),
                    status.severity
                );
                ProvisioningPlan {
                    profile_id: profile_id.clone(),
                    basis_timestamp: profile.timestamp(),
                    status,
                    operands,
                    future: units,
                }
            }
        };
        monitor.worked(20);
        monitor.done();
        Ok(plan)
    }
}

fn cancelled(profile: &crate::profile::Profile, profile_id: &str) -> ProvisioningPlan {
    info!("Planning for profile {} cancelled", profile_id);
    let mut status = Status::multi(format!("Plan for profile {}", profile_id));
    status.add(Status::cancel());
    ProvisioningPlan::failed(profile, status)
}

/// Apply lock flags to the request
///
/// Removing a LOCK_UNINSTALL unit and adding another version of a
/// LOCK_UPDATE id are both dropped with a warning. Dropping an addition
/// also drops the removal of the locked unit it would have replaced.
fn normalize(request: &ProfileChangeRequest) -> Normalized {
    let profile = request.profile();
    let mut warnings = Vec::new();
    let mut pinned_ids: BTreeSet<String> = BTreeSet::new();

    let mut filter_locked = |units: &[Arc<InstallableUnit>], warnings: &mut Vec<Problem>| {
        let mut out = Vec::new();
        for unit in units {
            let locked = profile.units_with_id(&unit.id).into_iter().find(|installed| {
                installed.key() != unit.key()
                    && profile.lock_flags(&installed.key()).contains(LockFlags::UPDATE)
            });
            match locked {
                Some(installed) => {
                    warnings.push(Problem::LockViolation {
                        unit: installed.key(),
                        action: "update".to_string(),
                    });
                    pinned_ids.insert(unit.id.clone());
                }
                None => out.push(unit.clone()),
            }
        }
        out
    };
    let additions = filter_locked(request.additions(), &mut warnings);
    let optional = filter_locked(request.optional_additions(), &mut warnings);

    let mut removals = BTreeSet::new();
    for key in request.removals() {
        if !profile.contains(key) {
            debug!("Ignoring removal of {}: not installed", key);
            continue;
        }
        let flags = profile.lock_flags(key);
        if flags.contains(LockFlags::UNINSTALL) {
            warnings.push(Problem::LockViolation {
                unit: key.clone(),
                action: "uninstall".to_string(),
            });
            continue;
        }
        if pinned_ids.contains(&key.id) && flags.contains(LockFlags::UPDATE) {
            continue;
        }
        removals.insert(key.clone());
    }

    Normalized {
        additions,
        optional,
        removals,
        warnings,
    }
}

/// Plans and performs in one step
pub struct Director {
    planner: Planner,
    engine: Arc<Engine>,
}

impl Director {
    pub fn new(planner: Planner, engine: Arc<Engine>) -> Self {
        Self { planner, engine }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Plan `request` and run it with the default phase set
    ///
    /// ERROR and CANCEL plans are returned without touching the engine.
    /// Plan warnings are carried into the returned status.
    pub fn provision(
        &self,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Status> {
        let plan = self
            .planner
            .get_provisioning_plan(request, context, monitor)?;
        if !plan.status.is_success() {
            return Ok(plan.status);
        }

        let performed = self
            .engine
            .perform_plan(&plan, &PhaseSet::default_set(), context, monitor)?;
        let mut status = plan.status;
        status.merge(performed);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{PROP_LOCK, Profile};
    use crate::progress::NullMonitor;
    use crate::repository::MemoryRepository;
    use crate::status::Severity;
    use crate::version::{Version, VersionRange};
    use std::collections::BTreeMap;

    fn unit(id: &str, version: &str) -> InstallableUnit {
        InstallableUnit::builder(id, Version::parse(version).unwrap())
            .build()
            .unwrap()
    }

    fn locked_profile(flags: LockFlags) -> Arc<Profile> {
        let a = Arc::new(unit("a", "1.0"));
        let mut props = BTreeMap::new();
        props.insert(
            a.key(),
            [
                ("root".to_string(), "true".to_string()),
                (PROP_LOCK.to_string(), flags.bits().to_string()),
            ]
            .into_iter()
            .collect(),
        );
        Arc::new(Profile::from_parts("p", 5, vec![a], props, BTreeMap::new()))
    }

    #[test]
    fn test_planner_state_names() {
        assert_eq!(PlannerState::ConstraintSolving.to_string(), "constraint-solving");
    }

    #[test]
    fn test_lock_uninstall_drops_removal() {
        let profile = locked_profile(LockFlags::UNINSTALL);
        let mut request = ProfileChangeRequest::new(profile.clone());
        request.remove(UnitKey::new("a", Version::new(1, 0, 0)));

        let plan = Planner::new()
            .get_provisioning_plan(&request, &ProvisioningContext::new(), &NullMonitor::new())
            .unwrap();
        assert_eq!(plan.status.severity, Severity::Warning);
        assert!(plan.uninstalls().next().is_none());
        assert!(matches!(
            plan.status.problems()[0],
            Problem::LockViolation { action, .. } if action == "uninstall"
        ));
        assert_eq!(plan.basis_timestamp, 5);
    }

    #[test]
    fn test_lock_update_drops_replacement() {
        let profile = locked_profile(LockFlags::UPDATE);
        let newer = Arc::new(unit("a", "2.0"));
        let mut request = ProfileChangeRequest::new(profile.clone());
        request.replace(UnitKey::new("a", Version::new(1, 0, 0)), newer.clone());

        let context = ProvisioningContext::new()
            .with_repository(Arc::new(MemoryRepository::with_units("r", vec![(*newer).clone()])));
        let plan = Planner::new()
            .get_provisioning_plan(&request, &context, &NullMonitor::new())
            .unwrap();
        assert_eq!(plan.status.severity, Severity::Warning);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unsatisfiable_plan_has_no_operands() {
        let profile = Arc::new(Profile::empty("p"));
        let app = InstallableUnit::builder("app", Version::new(1, 0, 0))
            .requires(crate::metadata::Requirement::unit("ghost", VersionRange::any()))
            .build()
            .unwrap();
        let mut request = ProfileChangeRequest::new(profile);
        request.add(Arc::new(app));

        let plan = Planner::new()
            .get_provisioning_plan(&request, &ProvisioningContext::new(), &NullMonitor::new())
            .unwrap();
        assert!(plan.status.is_error());
        assert!(plan.operands.is_empty());
    }
}
