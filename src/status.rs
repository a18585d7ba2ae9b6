// src/status.rs

//! Result status trees for planning and execution
//!
//! Domain problems are values, not errors: the planner and the engine
//! return a [`Status`] whose severity is the maximum over its children, with
//! one child per diagnostic.

use crate::metadata::{Requirement, UnitKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Severity of a status, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Ok,
    Info,
    Warning,
    Error,
    Cancel,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic taxonomy carried by statuses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    #[error("{requested_by} requires '{requirement}' but no provider satisfies it")]
    UnsatisfiableRequirement {
        requirement: Requirement,
        requested_by: String,
    },

    #[error("{first} and {second} cannot both be installed: {reason}")]
    ConflictingCapability {
        first: UnitKey,
        second: UnitKey,
        reason: String,
    },

    #[error("{unit} is locked against {action}; request dropped")]
    LockViolation { unit: UnitKey, action: String },

    #[error("optional {target} was not installed: {reason}")]
    OptionalDropped { target: String, reason: String },

    #[error("artifact trust denied for {artifacts:?}: {reason}")]
    ArtifactTrustDenied {
        artifacts: Vec<String>,
        reason: String,
    },

    #[error("phase '{phase}' failed{}: {message}", unit_suffix(.unit))]
    PhaseExecutionFailure {
        phase: String,
        unit: Option<UnitKey>,
        message: String,
    },

    #[error("search limit of {limit} steps exceeded")]
    SearchLimitExceeded { limit: usize },

    #[error("operation cancelled")]
    Cancelled,
}

fn unit_suffix(unit: &Option<UnitKey>) -> String {
    unit.as_ref().map(|u| format!(" for {}", u)).unwrap_or_default()
}

impl Problem {
    /// Severity a status carrying this problem takes
    pub fn severity(&self) -> Severity {
        match self {
            Problem::LockViolation { .. } | Problem::OptionalDropped { .. } => Severity::Warning,
            Problem::Cancelled => Severity::Cancel,
            _ => Severity::Error,
        }
    }
}

/// A status node with optional children
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub severity: Severity,
    pub message: String,
    pub problem: Option<Problem>,
    pub children: Vec<Status>,
}

impl Status {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            problem: None,
            children: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Severity::Ok, "OK")
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn cancel() -> Self {
        Self::from_problem(Problem::Cancelled)
    }

    /// A leaf status describing one problem
    pub fn from_problem(problem: Problem) -> Self {
        Self {
            severity: problem.severity(),
            message: problem.to_string(),
            problem: Some(problem),
            children: Vec::new(),
        }
    }

    /// An OK parent that takes the worst severity of its children
    pub fn multi(message: impl Into<String>) -> Self {
        Self::new(Severity::Ok, message)
    }

    /// Attach a child, raising this status' severity if needed
    pub fn add(&mut self, child: Status) {
        if child.severity > self.severity {
            self.severity = child.severity;
        }
        self.children.push(child);
    }

    /// Attach children from another multi-status
    pub fn merge(&mut self, other: Status) {
        if other.children.is_empty() {
            if other.severity != Severity::Ok {
                self.add(other);
            }
        } else {
            for child in other.children {
                self.add(child);
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }

    /// OK, INFO, or WARNING
    pub fn is_success(&self) -> bool {
        self.severity < Severity::Error
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_cancel(&self) -> bool {
        self.severity == Severity::Cancel
    }

    /// All problems in this tree, depth first
    pub fn problems(&self) -> Vec<&Problem> {
        let mut out = Vec::new();
        self.collect_problems(&mut out);
        out
    }

    fn collect_problems<'a>(&'a self, out: &mut Vec<&'a Problem>) {
        if let Some(ref problem) = self.problem {
            out.push(problem);
        }
        for child in &self.children {
            child.collect_problems(out);
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}[{}] {}", "", self.severity, self.message, indent = depth * 2)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
