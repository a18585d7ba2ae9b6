// src/trust/mod.rs

//! Artifact trust
//!
//! Before any install phase runs, collected artifacts are checked for a
//! detached signature. Unsigned artifacts and artifacts signed by a key not
//! in the [`TrustStore`] are each governed by a [`TrustPolicy`]; the
//! [`CertificateChecker`] applies both and reports a status.

mod checker;
pub mod signature;

pub use checker::{CertificateChecker, CheckerState};
pub use signature::{ArtifactSignature, SignatureError, SigningKeyPair};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::RwLock;
use tracing::info;

/// What to do with artifacts in a given trust category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustPolicy {
    /// Accept silently
    Allow,
    /// Refuse the whole operation
    Fail,
    /// Ask the registered [`TrustPrompt`]
    #[default]
    Prompt,
}

impl TrustPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustPolicy::Allow => "allow",
            TrustPolicy::Fail => "fail",
            TrustPolicy::Prompt => "prompt",
        }
    }
}

impl fmt::Display for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(TrustPolicy::Allow),
            "fail" => Ok(TrustPolicy::Fail),
            "prompt" => Ok(TrustPolicy::Prompt),
            other => Err(Error::ConfigError(format!(
                "unknown trust policy '{}' (expected allow, fail or prompt)",
                other
            ))),
        }
    }
}

/// Policies for the two trust categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrustSettings {
    /// Artifacts with no signature sidecar
    pub unsigned: TrustPolicy,
    /// Validly signed artifacts whose signer is not in the trust store
    pub untrusted: TrustPolicy,
}

impl TrustSettings {
    pub fn new(unsigned: TrustPolicy, untrusted: TrustPolicy) -> Self {
        Self {
            unsigned,
            untrusted,
        }
    }

    /// Accept everything
    pub fn permissive() -> Self {
        Self::new(TrustPolicy::Allow, TrustPolicy::Allow)
    }
}

/// Set of trusted signer public keys (base64)
///
/// Shared between runs; keys remembered from a prompt are added here.
#[derive(Debug, Default)]
pub struct TrustStore {
    keys: RwLock<BTreeSet<String>>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: RwLock::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Trust a key; returns false if it was already trusted
    pub fn add(&self, public_key: &str) -> bool {
        match self.keys.write() {
            Ok(mut keys) => {
                let added = keys.insert(public_key.to_string());
                if added {
                    info!("Trusting signer key {}", public_key);
                }
                added
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, public_key: &str) -> bool {
        self.keys
            .read()
            .map(|keys| keys.contains(public_key))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys
            .read()
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.keys.read().map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A validly signed artifact whose signer is not trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedArtifact {
    pub path: PathBuf,
    pub public_key: String,
    pub key_id: Option<String>,
}

/// Answer from a [`TrustPrompt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrustResponse {
    pub allow_unsigned: bool,
    pub allow_untrusted: bool,
    /// Add the untrusted signers to the trust store
    pub remember: bool,
}

impl TrustResponse {
    pub fn accept_all() -> Self {
        Self {
            allow_unsigned: true,
            allow_untrusted: true,
            remember: false,
        }
    }

    pub fn decline() -> Self {
        Self::default()
    }
}

/// Interactive trust decision
pub trait TrustPrompt: Send + Sync {
    fn prompt_trust(&self, untrusted: &[UntrustedArtifact], unsigned: &[PathBuf]) -> TrustResponse;
}

/// Prompt that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub TrustResponse);

impl TrustPrompt for FixedPrompt {
    fn prompt_trust(&self, _untrusted: &[UntrustedArtifact], _unsigned: &[PathBuf]) -> TrustResponse {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!("ALLOW".parse::<TrustPolicy>().unwrap(), TrustPolicy::Allow);
        assert_eq!("fail".parse::<TrustPolicy>().unwrap(), TrustPolicy::Fail);
        assert!("maybe".parse::<TrustPolicy>().is_err());
        assert_eq!(TrustPolicy::default(), TrustPolicy::Prompt);
    }

    #[test]
    fn test_store_add_once() {
        let store = TrustStore::with_keys(["k1"]);
        assert!(store.contains("k1"));
        assert!(store.add("k2"));
        assert!(!store.add("k2"));
        assert_eq!(store.keys(), vec!["k1".to_string(), "k2".to_string()]);
    }
}
