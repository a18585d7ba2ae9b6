// src/trust/checker.rs

//! Certificate checker
//!
//! Collects artifact paths, verifies each one's signature sidecar, sorts
//! them into unsigned and untrusted groups, then applies the two policies.
//! FAIL policies are evaluated before any prompt so a refusal never asks the
//! user first.

use super::signature::ArtifactSignature;
use super::{TrustPolicy, TrustPrompt, TrustSettings, TrustStore, UntrustedArtifact};
use crate::repository::artifact::signature_path;
use crate::status::{Problem, Status};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerState {
    Collecting,
    Evaluating,
    Allowed,
    Denied,
    Prompted,
}

enum Classification {
    Trusted,
    Unsigned,
    Untrusted(UntrustedArtifact),
}

/// Applies [`TrustSettings`] to a set of artifacts
pub struct CertificateChecker {
    settings: TrustSettings,
    store: Arc<TrustStore>,
    prompt: Option<Arc<dyn TrustPrompt>>,
    artifacts: Vec<PathBuf>,
    state: CheckerState,
}

impl CertificateChecker {
    pub fn new(settings: TrustSettings, store: Arc<TrustStore>) -> Self {
        Self {
            settings,
            store,
            prompt: None,
            artifacts: Vec::new(),
            state: CheckerState::Collecting,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn TrustPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Queue an artifact for checking
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.push(path.into());
    }

    pub fn state(&self) -> CheckerState {
        self.state
    }

    fn classify(&self, path: &Path) -> Result<Classification, String> {
        let sidecar = signature_path(path);
        if !sidecar.is_file() {
            return Ok(Classification::Unsigned);
        }
        let raw = fs::read(&sidecar).map_err(|e| format!("cannot read {}: {}", sidecar.display(), e))?;
        let signature = ArtifactSignature::from_json(&raw).map_err(|e| e.to_string())?;
        let content = fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        signature.verify(&content).map_err(|e| e.to_string())?;

        if self.store.contains(&signature.public_key) {
            Ok(Classification::Trusted)
        } else {
            Ok(Classification::Untrusted(UntrustedArtifact {
                path: path.to_path_buf(),
                public_key: signature.public_key,
                key_id: signature.key_id,
            }))
        }
    }

    fn deny(&mut self, artifacts: Vec<String>, reason: &str) -> Status {
        self.state = CheckerState::Denied;
        warn!("Artifact trust denied: {}", reason);
        Status::from_problem(Problem::ArtifactTrustDenied {
            artifacts,
            reason: reason.to_string(),
        })
    }

    /// Evaluate all queued artifacts
    ///
    /// OK when everything is allowed, ERROR for an invalid signature or a
    /// FAIL policy hit, CANCEL when the prompt declines.
    pub fn start(&mut self) -> Status {
        self.state = CheckerState::Evaluating;

        let mut unsigned = Vec::new();
        let mut untrusted = Vec::new();
        let artifacts = std::mem::take(&mut self.artifacts);
        for path in &artifacts {
            match self.classify(path) {
                Ok(Classification::Trusted) => debug!("{} signed by trusted key", path.display()),
                Ok(Classification::Unsigned) => unsigned.push(path.clone()),
                Ok(Classification::Untrusted(artifact)) => untrusted.push(artifact),
                Err(reason) => {
                    let reason = format!("invalid signature: {}", reason);
                    return self.deny(vec![path.display().to_string()], &reason);
                }
            }
        }
        self.artifacts = artifacts;

        if !unsigned.is_empty() && self.settings.unsigned == TrustPolicy::Fail {
            let paths = unsigned.iter().map(|p| p.display().to_string()).collect();
            return self.deny(paths, "unsigned content is not allowed");
        }
        if !untrusted.is_empty() && self.settings.untrusted == TrustPolicy::Fail {
            let paths = untrusted.iter().map(|a| a.path.display().to_string()).collect();
            return self.deny(paths, "content signed by an untrusted key is not allowed");
        }

        let ask_unsigned = !unsigned.is_empty() && self.settings.unsigned == TrustPolicy::Prompt;
        let ask_untrusted =
            !untrusted.is_empty() && self.settings.untrusted == TrustPolicy::Prompt;
        if !ask_unsigned && !ask_untrusted {
            self.state = CheckerState::Allowed;
            return Status::ok();
        }

        let Some(prompt) = self.prompt.clone() else {
            // No one to ask: allow this run without remembering anything
            info!(
                "No trust prompt registered; allowing {} unsigned and {} untrusted artifacts",
                unsigned.len(),
                untrusted.len()
            );
            self.state = CheckerState::Allowed;
            return Status::ok();
        };

        self.state = CheckerState::Prompted;
        let prompt_untrusted: &[UntrustedArtifact] = if ask_untrusted { &untrusted } else { &[] };
        let prompt_unsigned: &[PathBuf] = if ask_unsigned { &unsigned } else { &[] };
        let response = prompt.prompt_trust(prompt_untrusted, prompt_unsigned);

        if (ask_unsigned && !response.allow_unsigned) || (ask_untrusted && !response.allow_untrusted) {
            self.state = CheckerState::Denied;
            info!("Trust prompt declined");
            return Status::cancel();
        }

        if response.remember && ask_untrusted {
            for artifact in &untrusted {
                self.store.add(&artifact.public_key);
            }
        }
        self.state = CheckerState::Allowed;
        Status::ok()
    }
}
