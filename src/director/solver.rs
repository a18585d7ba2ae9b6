// src/director/solver.rs

//! Backtracking constraint solver
//!
//! The search starts from the mandatory units and repeatedly picks the first
//! unsatisfied requirement (selected units in key order, requirements in
//! declaration order), trying its providers in preference order: installed
//! units first, then higher versions, then key order. Every tentative
//! selection is checked against singleton and bounded-cardinality
//! constraints before the search descends.
//!
//! After the mandatory solve, optional additions and greedy optional
//! requirements are satisfied best-effort; each one either extends the
//! solution completely or is dropped with a warning.

use super::slicer::Slice;
use crate::error::{Error, Result};
use crate::metadata::{InstallableUnit, Requirement, UnitKey};
use crate::progress::ProgressMonitor;
use crate::status::{Problem, Status};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default bound on search steps
pub const DEFAULT_SEARCH_LIMIT: usize = 100_000;

/// What the solution must, may, and must not contain
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Units that must be selected
    pub mandatory: Vec<Arc<InstallableUnit>>,
    /// Units selected when possible
    pub optional: Vec<Arc<InstallableUnit>>,
    /// Currently installed units, preferred over other candidates
    pub installed: BTreeSet<UnitKey>,
    /// Units that may not be selected
    pub forbidden: BTreeSet<UnitKey>,
    /// Ids whose only admissible version is the pinned key
    pub pinned: BTreeMap<String, UnitKey>,
}

/// Outcome of a solve
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A consistent unit set; `status` carries warnings
    Solved {
        units: Vec<Arc<InstallableUnit>>,
        status: Status,
    },
    /// No consistent set exists; one child per diagnostic
    Unsatisfiable(Status),
}

enum Abort {
    Cancelled,
    Limit,
}

pub struct Solver<'a> {
    slice: &'a Slice,
    search_limit: usize,
    monitor: &'a dyn ProgressMonitor,
}

impl<'a> Solver<'a> {
    pub fn new(slice: &'a Slice, search_limit: usize, monitor: &'a dyn ProgressMonitor) -> Self {
        Self {
            slice,
            search_limit,
            monitor,
        }
    }

    pub fn solve(&self, constraints: &Constraints) -> Result<Resolution> {
        let mut search = Search {
            slice: self.slice,
            constraints,
            monitor: self.monitor,
            limit: self.search_limit,
            steps: 0,
            best_depth: 0,
            failures: Vec::new(),
        };
        match search.run() {
            Ok(resolution) => Ok(resolution),
            Err(Abort::Cancelled) => Err(Error::Cancelled("solving".to_string())),
            Err(Abort::Limit) => {
                warn!("Search limit of {} steps exceeded", self.search_limit);
                let mut status = Status::multi("No solution found");
                status.add(Status::from_problem(Problem::SearchLimitExceeded {
                    limit: self.search_limit,
                }));
                Ok(Resolution::Unsatisfiable(status))
            }
        }
    }
}

type CapabilityKey = (String, String);

fn capability_key(namespace: &str, name: &str) -> CapabilityKey {
    (namespace.to_string(), name.to_string())
}

/// A requirement of a selected unit: owner key and declaration index
type RequirementRef = (UnitKey, usize);

fn requirement<'s>(slice: &'s Slice, entry: &RequirementRef) -> Option<&'s Requirement> {
    slice.requirements(&entry.0).get(entry.1)
}

/// Selected units with provider counts kept current on every push and pop
#[derive(Debug, Clone, Default)]
struct Selection {
    units: BTreeMap<UnitKey, Arc<InstallableUnit>>,
    by_id: BTreeMap<String, BTreeSet<UnitKey>>,
    /// Selected units by provided capability
    providers: BTreeMap<CapabilityKey, BTreeSet<UnitKey>>,
    /// Requirements of selected units by required capability
    dependents: BTreeMap<CapabilityKey, BTreeSet<RequirementRef>>,
    /// Selected providers of every requirement of every selected unit
    counts: BTreeMap<RequirementRef, usize>,
    /// Requirements with fewer providers than their minimum
    open: BTreeSet<RequirementRef>,
}

impl Selection {
    fn len(&self) -> usize {
        self.units.len()
    }

    fn contains(&self, key: &UnitKey) -> bool {
        self.units.contains_key(key)
    }

    fn count(&self, entry: &RequirementRef) -> usize {
        self.counts.get(entry).copied().unwrap_or_default()
    }

    /// Selected units matching `req`
    fn count_providers(&self, req: &Requirement) -> usize {
        self.providers
            .get(&capability_key(&req.namespace, &req.name))
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.units.get(k))
                    .filter(|unit| req.is_match(unit))
                    .count()
            })
            .unwrap_or_default()
    }

    /// Requirements of selected units that `unit` satisfies
    fn dependents_of(&self, unit: &InstallableUnit, slice: &Slice) -> BTreeSet<RequirementRef> {
        let mut found = BTreeSet::new();
        for cap in &unit.provided {
            let Some(entries) = self.dependents.get(&capability_key(&cap.namespace, &cap.name))
            else {
                continue;
            };
            for entry in entries {
                if requirement(slice, entry).is_some_and(|req| req.is_match(unit)) {
                    found.insert(entry.clone());
                }
            }
        }
        found
    }

    fn push(&mut self, unit: Arc<InstallableUnit>, slice: &Slice) {
        let key = unit.key();
        for entry in self.dependents_of(&unit, slice) {
            let min = requirement(slice, &entry).map_or(0, |req| req.min as usize);
            let count = self.counts.entry(entry.clone()).or_default();
            *count += 1;
            if *count >= min {
                self.open.remove(&entry);
            }
        }

        for cap in &unit.provided {
            self.providers
                .entry(capability_key(&cap.namespace, &cap.name))
                .or_default()
                .insert(key.clone());
        }
        self.by_id
            .entry(unit.id.clone())
            .or_default()
            .insert(key.clone());
        self.units.insert(key.clone(), unit);

        // Own requirements are counted with the unit already selected
        for (idx, req) in slice.requirements(&key).iter().enumerate() {
            let entry = (key.clone(), idx);
            let count = self.count_providers(req);
            if count < req.min as usize {
                self.open.insert(entry.clone());
            }
            self.counts.insert(entry.clone(), count);
            self.dependents
                .entry(capability_key(&req.namespace, &req.name))
                .or_default()
                .insert(entry);
        }
    }

    fn pop(&mut self, key: &UnitKey, slice: &Slice) {
        let Some(unit) = self.units.remove(key) else {
            return;
        };

        for (idx, req) in slice.requirements(key).iter().enumerate() {
            let entry = (key.clone(), idx);
            if let Some(entries) = self
                .dependents
                .get_mut(&capability_key(&req.namespace, &req.name))
            {
                entries.remove(&entry);
            }
            self.counts.remove(&entry);
            self.open.remove(&entry);
        }

        for cap in &unit.provided {
            if let Some(keys) = self
                .providers
                .get_mut(&capability_key(&cap.namespace, &cap.name))
            {
                keys.remove(key);
            }
        }
        if let Some(keys) = self.by_id.get_mut(&unit.id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_id.remove(&unit.id);
            }
        }

        for entry in self.dependents_of(&unit, slice) {
            let min = requirement(slice, &entry).map_or(0, |req| req.min as usize);
            let count = self.counts.entry(entry.clone()).or_default();
            *count = count.saturating_sub(1);
            if *count < min {
                self.open.insert(entry);
            }
        }
    }
}

/// One unsatisfied requirement being worked on by the search
struct Frame {
    candidates: Vec<Arc<InstallableUnit>>,
    next: usize,
    /// Candidate currently selected on behalf of this frame
    pushed: Option<UnitKey>,
}

struct Search<'a> {
    slice: &'a Slice,
    constraints: &'a Constraints,
    monitor: &'a dyn ProgressMonitor,
    limit: usize,
    steps: usize,
    best_depth: usize,
    failures: Vec<Problem>,
}

impl Search<'_> {
    fn run(&mut self) -> std::result::Result<Resolution, Abort> {
        let mut selected = Selection::default();

        for unit in &self.constraints.mandatory {
            if selected.contains(&unit.key()) {
                continue;
            }
            if let Some(problem) = self.conflict(unit, &selected) {
                return Ok(self.unsatisfiable(vec![problem]));
            }
            selected.push(unit.clone(), self.slice);
        }

        if !self.extend(&mut selected)? {
            let failures = std::mem::take(&mut self.failures);
            return Ok(self.unsatisfiable(failures));
        }
        debug!("Mandatory solve selected {} units in {} steps", selected.len(), self.steps);

        let mut status = Status::multi("Solved");
        self.add_optional_units(&mut selected, &mut status)?;
        self.satisfy_greedy_optionals(&mut selected, &mut status)?;

        Ok(Resolution::Solved {
            units: selected.units.into_values().collect(),
            status,
        })
    }

    fn unsatisfiable(&self, mut problems: Vec<Problem>) -> Resolution {
        if problems.is_empty() {
            problems.push(Problem::SearchLimitExceeded { limit: self.limit });
        }
        let mut status = Status::multi("No solution found");
        for problem in problems {
            status.add(Status::from_problem(problem));
        }
        Resolution::Unsatisfiable(status)
    }

    fn tick(&mut self) -> std::result::Result<(), Abort> {
        self.steps += 1;
        if self.steps > self.limit {
            return Err(Abort::Limit);
        }
        if self.monitor.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        Ok(())
    }

    fn record(&mut self, depth: usize, problem: Problem) {
        match depth.cmp(&self.best_depth) {
            Ordering::Greater => {
                self.best_depth = depth;
                self.failures = vec![problem];
            }
            Ordering::Equal => {
                if !self.failures.contains(&problem) {
                    self.failures.push(problem);
                }
            }
            Ordering::Less => {}
        }
    }

    /// First mandatory requirement with too few selected providers
    fn first_unsatisfied(&self, selected: &Selection) -> Option<(UnitKey, Requirement)> {
        selected.open.iter().find_map(|entry| {
            requirement(self.slice, entry).map(|req| (entry.0.clone(), req.clone()))
        })
    }

    fn is_admissible(&self, unit: &InstallableUnit) -> bool {
        let key = unit.key();
        if self.constraints.forbidden.contains(&key) {
            return false;
        }
        match self.constraints.pinned.get(&unit.id) {
            Some(pinned) => *pinned == key,
            None => true,
        }
    }

    /// Admissible, unselected providers in preference order
    fn candidates(&self, req: &Requirement, selected: &Selection) -> Vec<Arc<InstallableUnit>> {
        let mut candidates: Vec<Arc<InstallableUnit>> = self
            .slice
            .pool
            .providers(req)
            .into_iter()
            .filter(|unit| !selected.contains(&unit.key()) && self.is_admissible(unit))
            .collect();
        let installed = &self.constraints.installed;
        candidates.sort_by(|a, b| {
            let a_installed = installed.contains(&a.key());
            let b_installed = installed.contains(&b.key());
            b_installed
                .cmp(&a_installed)
                .then_with(|| b.version.cmp(&a.version))
                .then_with(|| a.key().cmp(&b.key()))
        });
        candidates
    }

    /// Why `candidate` cannot join `selected`, if it cannot
    ///
    /// Selected units never exceed a bounded maximum, so only requirements
    /// the candidate itself satisfies, and the candidate's own requirements,
    /// can be pushed over their bound.
    fn conflict(&self, candidate: &Arc<InstallableUnit>, selected: &Selection) -> Option<Problem> {
        let candidate_key = candidate.key();
        if selected.contains(&candidate_key) {
            return None;
        }

        if let Some(keys) = selected.by_id.get(&candidate.id) {
            for other in keys.iter().filter_map(|k| selected.units.get(k)) {
                if other.version != candidate.version
                    && (other.is_singleton() || candidate.is_singleton())
                {
                    return Some(Problem::ConflictingCapability {
                        first: other.key(),
                        second: candidate_key,
                        reason: format!(
                            "only one version of singleton '{}' may be installed",
                            other.id
                        ),
                    });
                }
            }
        }

        for entry in selected.dependents_of(candidate, self.slice) {
            let Some(req) = requirement(self.slice, &entry) else {
                continue;
            };
            if req.is_bounded() && selected.count(&entry) + 1 > req.max as usize {
                return Some(Problem::ConflictingCapability {
                    first: entry.0,
                    second: candidate_key,
                    reason: format!("'{}' allows at most {} provider(s)", req, req.max),
                });
            }
        }

        for req in self.slice.requirements(&candidate_key) {
            if !req.is_bounded() {
                continue;
            }
            let mut count = selected.count_providers(req);
            if req.is_match(candidate) {
                count += 1;
            }
            if count > req.max as usize {
                return Some(Problem::ConflictingCapability {
                    first: candidate_key.clone(),
                    second: candidate_key,
                    reason: format!("'{}' allows at most {} provider(s)", req, req.max),
                });
            }
        }
        None
    }

    /// Depth-first search over providers of the first open requirement
    ///
    /// Returns true with `selected` extended to a consistent set, or false
    /// with `selected` restored to what it was on entry.
    fn extend(&mut self, selected: &mut Selection) -> std::result::Result<bool, Abort> {
        let mut stack: Vec<Frame> = Vec::new();
        loop {
            self.tick()?;
            let Some((requester, req)) = self.first_unsatisfied(selected) else {
                return Ok(true);
            };
            let candidates = self.candidates(&req, selected);
            if candidates.is_empty() {
                self.record(
                    selected.len(),
                    Problem::UnsatisfiableRequirement {
                        requirement: req,
                        requested_by: requester.to_string(),
                    },
                );
            }
            stack.push(Frame {
                candidates,
                next: 0,
                pushed: None,
            });

            // Select the next untried candidate, unwinding exhausted frames
            loop {
                let Some(frame) = stack.last_mut() else {
                    return Ok(false);
                };
                if let Some(key) = frame.pushed.take() {
                    selected.pop(&key, self.slice);
                }
                let Some(candidate) = frame.candidates.get(frame.next).cloned() else {
                    stack.pop();
                    continue;
                };
                frame.next += 1;
                if let Some(problem) = self.conflict(&candidate, selected) {
                    self.record(selected.len(), problem);
                    continue;
                }
                frame.pushed = Some(candidate.key());
                selected.push(candidate, self.slice);
                break;
            }
        }
    }

    /// Try to add `unit` and everything it needs; adopt the result on success
    fn try_add(
        &mut self,
        unit: &Arc<InstallableUnit>,
        selected: &mut Selection,
    ) -> std::result::Result<std::result::Result<(), String>, Abort> {
        if let Some(problem) = self.conflict(unit, selected) {
            return Ok(Err(problem.to_string()));
        }
        let mut attempt = selected.clone();
        attempt.push(unit.clone(), self.slice);
        self.failures.clear();
        self.best_depth = 0;
        if self.extend(&mut attempt)? {
            *selected = attempt;
            Ok(Ok(()))
        } else {
            let reason = self
                .failures
                .first()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "no consistent extension".to_string());
            Ok(Err(reason))
        }
    }

    fn add_optional_units(
        &mut self,
        selected: &mut Selection,
        status: &mut Status,
    ) -> std::result::Result<(), Abort> {
        for unit in &self.constraints.optional {
            if selected.contains(&unit.key()) {
                continue;
            }
            let outcome = if self.is_admissible(unit) {
                self.try_add(unit, selected)?
            } else {
                Err("the unit is excluded by the request or a lock".to_string())
            };
            if let Err(reason) = outcome {
                debug!("Dropping optional addition {}: {}", unit.key(), reason);
                status.add(Status::from_problem(Problem::OptionalDropped {
                    target: unit.key().to_string(),
                    reason,
                }));
            }
        }
        Ok(())
    }

    fn satisfy_greedy_optionals(
        &mut self,
        selected: &mut Selection,
        status: &mut Status,
    ) -> std::result::Result<(), Abort> {
        let mut attempted: BTreeSet<RequirementRef> = BTreeSet::new();
        loop {
            let next = selected.counts.iter().find_map(|(entry, count)| {
                if *count != 0 || attempted.contains(entry) {
                    return None;
                }
                requirement(self.slice, entry)
                    .filter(|req| req.min == 0 && req.greedy)
                    .map(|req| (entry.clone(), req.clone()))
            });
            let Some((entry, req)) = next else {
                return Ok(());
            };
            attempted.insert(entry.clone());

            let candidates = self.candidates(&req, selected);
            if candidates.is_empty() {
                continue;
            }
            let mut last_reason = String::new();
            let mut satisfied = false;
            for candidate in candidates {
                match self.try_add(&candidate, selected)? {
                    Ok(()) => {
                        satisfied = true;
                        break;
                    }
                    Err(reason) => last_reason = reason,
                }
            }
            if !satisfied {
                status.add(Status::from_problem(Problem::OptionalDropped {
                    target: format!("{} (optional requirement of {})", req, entry.0),
                    reason: last_reason,
                }));
            }
        }
    }
}
