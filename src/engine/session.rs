// src/engine/session.rs

//! Per-run engine state shared by the phases

use super::touchpoint::Touchpoint;
use crate::director::ProvisioningContext;
use crate::error::Result;
use crate::metadata::UnitKey;
use crate::profile::ProfileBuilder;
use crate::progress::ProgressMonitor;
use crate::trust::{TrustPrompt, TrustSettings, TrustStore};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Trust configuration handed to the check-trust phase
#[derive(Clone)]
pub struct TrustContext {
    pub settings: TrustSettings,
    pub store: Arc<TrustStore>,
    pub prompt: Option<Arc<dyn TrustPrompt>>,
}

impl Default for TrustContext {
    fn default() -> Self {
        Self {
            settings: TrustSettings::default(),
            store: Arc::new(TrustStore::new()),
            prompt: None,
        }
    }
}

impl std::fmt::Debug for TrustContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustContext")
            .field("settings", &self.settings)
            .field("trusted_keys", &self.store.len())
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}

/// One engine run
///
/// Owns the profile working copy and a scratch directory named by a fresh
/// UUID. The directory is removed when the session is dropped.
pub struct Session<'a> {
    id: String,
    work_dir: PathBuf,
    working: ProfileBuilder,
    context: &'a ProvisioningContext,
    touchpoint: &'a dyn Touchpoint,
    trust: &'a TrustContext,
    monitor: &'a dyn ProgressMonitor,
    collected: BTreeMap<UnitKey, Vec<PathBuf>>,
    download_size: u64,
}

impl<'a> Session<'a> {
    pub(crate) fn create(
        base_dir: &Path,
        working: ProfileBuilder,
        context: &'a ProvisioningContext,
        touchpoint: &'a dyn Touchpoint,
        trust: &'a TrustContext,
        monitor: &'a dyn ProgressMonitor,
    ) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        let work_dir = base_dir.join(&id);
        fs::create_dir_all(&work_dir)?;
        debug!("Session {} working in {}", id, work_dir.display());
        Ok(Self {
            id,
            work_dir,
            working,
            context,
            touchpoint,
            trust,
            monitor,
            collected: BTreeMap::new(),
            download_size: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn working(&self) -> &ProfileBuilder {
        &self.working
    }

    pub fn working_mut(&mut self) -> &mut ProfileBuilder {
        &mut self.working
    }

    pub fn context(&self) -> &'a ProvisioningContext {
        self.context
    }

    pub fn touchpoint(&self) -> &'a dyn Touchpoint {
        self.touchpoint
    }

    pub fn trust(&self) -> &'a TrustContext {
        self.trust
    }

    pub fn monitor(&self) -> &'a dyn ProgressMonitor {
        self.monitor
    }

    /// Remember a collected artifact file for `unit`
    pub fn record_artifact(&mut self, unit: &UnitKey, path: PathBuf) {
        self.collected.entry(unit.clone()).or_default().push(path);
    }

    /// Files collected for `unit`
    pub fn artifacts(&self, unit: &UnitKey) -> &[PathBuf] {
        self.collected.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every collected file, in unit key order
    pub fn all_artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.collected.values().flatten()
    }

    pub fn add_download_size(&mut self, bytes: u64) {
        self.download_size += bytes;
    }

    pub fn download_size(&self) -> u64 {
        self.download_size
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.work_dir) {
            debug!("Could not remove session dir {}: {}", self.work_dir.display(), e);
        }
    }
}
