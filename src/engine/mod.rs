// src/engine/mod.rs

//! Plan execution
//!
//! The engine runs a [`PhaseSet`] over a list of operands, phase by phase:
//! every operand goes through one phase before the next phase starts. All
//! profile changes land on a working copy that is committed as a single new
//! revision once every phase has succeeded.
//!
//! # Failure model
//!
//! - A phase ending in ERROR stops the run; later phases never start.
//! - Cancellation is polled once per operand per phase and stops the run
//!   with CANCEL.
//! - In both cases the profile stays at its last committed revision.
//!   Touchpoint side effects already carried out are not undone.
//! - A plan computed against an older revision is refused.

mod phase;
pub mod phases;
mod session;
pub mod touchpoint;

pub use phase::{Phase, PhaseSet};
pub use session::{Session, TrustContext};
pub use touchpoint::{DirectoryTouchpoint, NullTouchpoint, Touchpoint};

use crate::director::{Operand, ProvisioningContext, ProvisioningPlan};
use crate::error::{Error, Result};
use crate::metadata::UnitKey;
use crate::profile::ProfileRegistry;
use crate::progress::ProgressMonitor;
use crate::status::{Problem, Severity, Status};
use crate::trust::{TrustPrompt, TrustSettings, TrustStore};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One mutex per profile id
#[derive(Debug, Default)]
pub struct ProfileLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `profile_id`
    pub fn lock_for(&self, profile_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(profile_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Fold a hook result into the run status; true when the run must stop
fn record(status: &mut Status, phase: &str, unit: Option<UnitKey>, result: Result<Status>) -> bool {
    match result {
        Ok(outcome) => status.merge(outcome),
        Err(Error::Cancelled(_)) => status.add(Status::cancel()),
        Err(e) => {
            warn!("Phase {} failed: {}", phase, e);
            status.add(Status::from_problem(Problem::PhaseExecutionFailure {
                phase: phase.to_string(),
                unit,
                message: e.to_string(),
            }));
        }
    }
    status.severity >= Severity::Error
}

/// Executes operands against profiles held by a registry
pub struct Engine {
    registry: Arc<dyn ProfileRegistry>,
    work_dir: PathBuf,
    touchpoint: Arc<dyn Touchpoint>,
    trust: TrustContext,
    locks: ProfileLocks,
}

impl Engine {
    /// Engine with a null touchpoint and default (prompt) trust policies
    pub fn new(registry: Arc<dyn ProfileRegistry>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            work_dir: work_dir.into(),
            touchpoint: Arc::new(NullTouchpoint),
            trust: TrustContext::default(),
            locks: ProfileLocks::new(),
        }
    }

    pub fn with_touchpoint(mut self, touchpoint: Arc<dyn Touchpoint>) -> Self {
        self.touchpoint = touchpoint;
        self
    }

    pub fn with_trust(mut self, settings: TrustSettings, store: Arc<TrustStore>) -> Self {
        self.trust.settings = settings;
        self.trust.store = store;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn TrustPrompt>) -> Self {
        self.trust.prompt = Some(prompt);
        self
    }

    pub fn registry(&self) -> &Arc<dyn ProfileRegistry> {
        &self.registry
    }

    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust.store
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run `phases` over `operands` against the current revision of a
    /// profile
    pub fn perform(
        &self,
        profile_id: &str,
        phases: &PhaseSet,
        operands: &[Operand],
        context: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Status> {
        self.run(profile_id, None, phases, operands, context, monitor)
    }

    /// Run a plan, refusing it if the profile moved since it was computed
    ///
    /// Only a successful plan runs; an ERROR or CANCEL plan gives an ERROR
    /// status holding the plan's status, and no phase is started.
    pub fn perform_plan(
        &self,
        plan: &ProvisioningPlan,
        phases: &PhaseSet,
        context: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Status> {
        if !plan.status.is_success() {
            warn!(
                "Refusing {} plan for profile {}",
                plan.status.severity, plan.profile_id
            );
            let mut refused = Status::error(format!(
                "plan for profile '{}' ended with {} and cannot be performed",
                plan.profile_id, plan.status.severity
            ));
            refused.children.push(plan.status.clone());
            return Ok(refused);
        }
        self.run(
            &plan.profile_id,
            Some(plan.basis_timestamp),
            phases,
            &plan.operands,
            context,
            monitor,
        )
    }

    fn run(
        &self,
        profile_id: &str,
        basis: Option<i64>,
        phases: &PhaseSet,
        operands: &[Operand],
        context: &ProvisioningContext,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Status> {
        let lock = self.locks.lock_for(profile_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let profile = self
            .registry
            .get_profile(profile_id)?
            .ok_or_else(|| Error::NotFoundError(format!("profile '{}'", profile_id)))?;

        let mut status = Status::multi(format!("Engine run for profile {}", profile_id));
        if let Some(basis) = basis
            && basis != profile.timestamp()
        {
            warn!(
                "Refusing stale plan for {}: based on {}, current is {}",
                profile_id,
                basis,
                profile.timestamp()
            );
            status.add(Status::error(format!(
                "plan was computed against revision {} but profile '{}' is at {}",
                basis,
                profile_id,
                profile.timestamp()
            )));
            return Ok(status);
        }

        let mut session = Session::create(
            &self.work_dir,
            profile.working_copy(),
            context,
            self.touchpoint.as_ref(),
            &self.trust,
            monitor,
        )?;
        info!(
            "Session {}: {} phase(s) over {} operand(s) for {}",
            session.id(),
            phases.len(),
            operands.len(),
            profile_id
        );
        let total_work: usize = phases
            .phases()
            .iter()
            .map(|phase| operands.iter().filter(|o| phase.applies_to(o)).count())
            .sum();
        monitor.begin_task(&format!("Provisioning {}", profile_id), total_work as u64);

        'phases: for phase in phases.phases() {
            let id = phase.id();
            debug!("Phase {} started", id);
            if record(&mut status, id, None, phase.prepare(&mut session)) {
                break;
            }
            for operand in operands {
                if monitor.is_cancelled() {
                    info!("Session {} cancelled during {}", session.id(), id);
                    status.add(Status::cancel());
                    break 'phases;
                }
                if phase.applies_to(operand) {
                    monitor.set_message(&format!("{}: {}", id, operand));
                    let unit = operand.unit().map(|u| u.key());
                    if record(&mut status, id, unit, phase.perform(&mut session, operand)) {
                        break 'phases;
                    }
                    monitor.worked(1);
                }
            }
            if record(&mut status, id, None, phase.complete(&mut session)) {
                break;
            }
            debug!("Phase {} complete", id);
        }

        if status.is_success() && phases.is_mutating() && session.working().is_changed() {
            match self.registry.commit(session.working().clone()) {
                Ok(revision) => info!(
                    "Committed revision {} of profile {}",
                    revision.timestamp(),
                    profile_id
                ),
                Err(Error::StalePlan(message)) => {
                    warn!("Commit refused: {}", message);
                    status.add(Status::error(message));
                }
                Err(e) => return Err(e),
            }
        } else if !status.is_success() {
            info!(
                "Session {} ended with {}; profile {} left at revision {}",
                session.id(),
                status.severity,
                profile_id,
                profile.timestamp()
            );
        }

        monitor.done();
        Ok(status)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("work_dir", &self.work_dir)
            .field("touchpoint", &self.touchpoint.name())
            .field("trust", &self.trust)
            .finish()
    }
}
