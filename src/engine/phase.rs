// src/engine/phase.rs

//! Phases and phase sets
//!
//! A phase sees every operand of a run between its `prepare` and `complete`
//! hooks; the engine finishes one phase across all operands before starting
//! the next.

use super::phases::{
    CheckTrustPhase, CollectPhase, ConfigurePhase, InstallPhase, PropertyPhase, SizingPhase,
    UnconfigurePhase, UninstallPhase,
};
use super::session::Session;
use crate::director::Operand;
use crate::error::Result;
use crate::status::Status;

/// One step of engine execution
///
/// `Err` from a hook is reported as a phase execution failure; domain
/// outcomes (a declined trust prompt, a sizing report) come back as a
/// [`Status`].
pub trait Phase: Send + Sync {
    fn id(&self) -> &str;

    /// Whether this phase changes the profile
    fn is_mutating(&self) -> bool {
        true
    }

    fn applies_to(&self, operand: &Operand) -> bool;

    fn prepare(&self, _session: &mut Session<'_>) -> Result<Status> {
        Ok(Status::ok())
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status>;

    fn complete(&self, _session: &mut Session<'_>) -> Result<Status> {
        Ok(Status::ok())
    }
}

/// Ordered list of phases
pub struct PhaseSet {
    phases: Vec<Box<dyn Phase>>,
}

impl PhaseSet {
    pub fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        Self { phases }
    }

    /// collect, check-trust, unconfigure, uninstall, property, install,
    /// configure
    pub fn default_set() -> Self {
        Self::new(vec![
            Box::new(CollectPhase),
            Box::new(CheckTrustPhase),
            Box::new(UnconfigurePhase),
            Box::new(UninstallPhase),
            Box::new(PropertyPhase),
            Box::new(InstallPhase),
            Box::new(ConfigurePhase),
        ])
    }

    /// Download size report only
    pub fn sizing() -> Self {
        Self::new(vec![Box::new(SizingPhase)])
    }

    /// Fetch and verify artifacts and report their size without touching
    /// the profile
    pub fn dry_run() -> Self {
        Self::new(vec![
            Box::new(CollectPhase),
            Box::new(CheckTrustPhase),
            Box::new(SizingPhase),
        ])
    }

    pub fn with_phase(mut self, phase: Box<dyn Phase>) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn phases(&self) -> &[Box<dyn Phase>] {
        &self.phases
    }

    pub fn ids(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.id()).collect()
    }

    /// Whether any phase changes the profile
    pub fn is_mutating(&self) -> bool {
        self.phases.iter().any(|p| p.is_mutating())
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl Default for PhaseSet {
    fn default() -> Self {
        Self::default_set()
    }
}

impl std::fmt::Debug for PhaseSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_sets() {
        let default = PhaseSet::default_set();
        assert_eq!(
            default.ids(),
            vec![
                "collect",
                "check-trust",
                "unconfigure",
                "uninstall",
                "property",
                "install",
                "configure"
            ]
        );
        assert!(default.is_mutating());
        assert!(!PhaseSet::sizing().is_mutating());
        assert!(!PhaseSet::dry_run().is_mutating());
    }
}
