// src/config.rs

//! Provisioner configuration
//!
//! Loaded from a TOML file; a missing file means defaults. A few settings
//! can be overridden from the environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `PROVISIONER_UNSIGNED_POLICY` | `trust.unsigned_policy` |
//! | `PROVISIONER_UNTRUSTED_POLICY` | `trust.untrusted_policy` |
//! | `PROVISIONER_DB_DIR` | directory of `registry.db_path` |
//!
//! ```toml
//! [trust]
//! unsigned_policy = "fail"
//! untrusted_policy = "prompt"
//! trusted_keys = ["base64-ed25519-public-key"]
//!
//! [planner]
//! search_limit = 50000
//!
//! [engine]
//! work_dir = "/var/lib/provisioner/work"
//!
//! [registry]
//! db_path = "/var/lib/provisioner/profiles.db"
//! ```

use crate::db::paths;
use crate::director::solver::DEFAULT_SEARCH_LIMIT;
use crate::error::{Error, Result};
use crate::trust::{TrustPolicy, TrustSettings, TrustStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_UNSIGNED_POLICY: &str = "PROVISIONER_UNSIGNED_POLICY";
pub const ENV_UNTRUSTED_POLICY: &str = "PROVISIONER_UNTRUSTED_POLICY";
pub const ENV_DB_DIR: &str = "PROVISIONER_DB_DIR";

const DB_FILE_NAME: &str = "profiles.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default)]
    pub unsigned_policy: TrustPolicy,
    #[serde(default)]
    pub untrusted_policy: TrustPolicy,
    /// Base64 Ed25519 public keys trusted from the start
    #[serde(default)]
    pub trusted_keys: Vec<String>,
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Session scratch space; defaults next to the database
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl ProvisioningConfig {
    /// Load from `path` and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load from `path` only; a missing file gives defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.planner.search_limit == 0 {
            return Err(Error::ConfigError(
                "planner.search_limit must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Apply overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_UNSIGNED_POLICY) {
            self.trust.unsigned_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_UNTRUSTED_POLICY) {
            self.trust.untrusted_policy = value.parse()?;
        }
        if let Some(dir) = lookup(ENV_DB_DIR) {
            self.registry.db_path = Some(PathBuf::from(dir).join(DB_FILE_NAME));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.registry
            .db_path
            .clone()
            .unwrap_or_else(paths::default_db_path)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.engine
            .work_dir
            .clone()
            .unwrap_or_else(|| paths::work_dir(&self.db_path().to_string_lossy()))
    }

    pub fn trust_settings(&self) -> TrustSettings {
        TrustSettings::new(self.trust.unsigned_policy, self.trust.untrusted_policy)
    }

    pub fn trust_store(&self) -> TrustStore {
        TrustStore::with_keys(self.trust.trusted_keys.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ProvisioningConfig::load_file(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, ProvisioningConfig::default());
        assert_eq!(config.trust.unsigned_policy, TrustPolicy::Prompt);
        assert_eq!(config.planner.search_limit, DEFAULT_SEARCH_LIMIT);
    }

    #[test]
    fn test_parse_sections() {
        let config = ProvisioningConfig::parse(
            r#"
            [trust]
            unsigned_policy = "fail"
            trusted_keys = ["abc"]

            [planner]
            search_limit = 10

            [registry]
            db_path = "/tmp/p.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.trust.unsigned_policy, TrustPolicy::Fail);
        assert_eq!(config.trust.untrusted_policy, TrustPolicy::Prompt);
        assert!(config.trust_store().contains("abc"));
        assert_eq!(config.planner.search_limit, 10);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/p.db"));
        assert_eq!(config.work_dir(), PathBuf::from("/tmp/work"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ProvisioningConfig::parse("[trust]\nunsigned_policy = \"maybe\"").is_err());
        assert!(ProvisioningConfig::parse("[planner]\nsearch_limit = 0").is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_UNSIGNED_POLICY, "allow"),
            (ENV_UNTRUSTED_POLICY, "fail"),
            (ENV_DB_DIR, "/srv/prov"),
        ]
        .into_iter()
        .collect();
        let mut config = ProvisioningConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(
            config.trust_settings(),
            TrustSettings::new(TrustPolicy::Allow, TrustPolicy::Fail)
        );
        assert_eq!(config.db_path(), PathBuf::from("/srv/prov/profiles.db"));

        let mut bad = ProvisioningConfig::default();
        assert!(bad.apply_overrides(|_| Some("nope".to_string())).is_err());
    }
}
