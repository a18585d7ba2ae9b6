// src/lib.rs

//! Provisioner
//!
//! Provisioning core for installable units: capability resolution, patch
//! and update substitution, planning, and phased execution against
//! versioned installation profiles.
//!
//! # Architecture
//!
//! - Units: immutable [`InstallableUnit`]s identified by `(id, version)`,
//!   matched through capabilities and [`Requirement`]s
//! - Planning: the [`Planner`] turns a change request into an ordered
//!   [`director::ProvisioningPlan`], or a plan whose [`Status`] explains why
//!   not
//! - Execution: the [`Engine`] runs a [`PhaseSet`] phase by phase and
//!   commits one new profile revision on success
//! - State: profiles are append-only revisions in SQLite (or memory)
//! - Trust: Ed25519 detached signatures checked by the
//!   [`CertificateChecker`] before anything is installed

pub mod config;
pub mod db;
pub mod director;
pub mod engine;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod profile;
pub mod progress;
pub mod query;
pub mod repository;
pub mod status;
pub mod trust;
pub mod version;

pub use director::{Director, Planner};
pub use engine::{Engine, PhaseSet};
pub use error::{Error, Result};
pub use metadata::{InstallableUnit, ProvidedCapability, Requirement};
pub use profile::Profile;
pub use query::Query;
pub use status::{Severity, Status};
pub use trust::{CertificateChecker, TrustPolicy};
pub use version::{Version, VersionRange};
