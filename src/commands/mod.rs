// src/commands/mod.rs
//! Command implementations for the provisioner CLI

mod install;
mod keys;
mod profile;
mod progress;
mod repo;
mod update;

pub use install::{cmd_install, cmd_remove};
pub use keys::{cmd_keygen, cmd_sign};
pub use profile::{
    cmd_profile_create, cmd_profile_delete, cmd_profile_history, cmd_profile_list,
    cmd_profile_lock, cmd_profile_revert, cmd_profile_show,
};
pub use progress::{ProgressBarMonitor, StdinPrompt};
pub use repo::{cmd_repo_list, cmd_repo_show};
pub use update::{cmd_update, cmd_updates};

use crate::cli::{ApplyArgs, SourceArgs};
use anyhow::{Context, Result};
use provisioner::config::ProvisioningConfig;
use provisioner::db::paths;
use provisioner::director::{Director, ProfileChangeRequest, ProvisioningContext};
use provisioner::engine::{DirectoryTouchpoint, Engine, PhaseSet};
use provisioner::profile::{ProfileRegistry, SqliteProfileRegistry};
use provisioner::repository::{DirectoryArtifactSource, FileRepository};
use provisioner::{Planner, Profile, Status};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Settings shared by every command
pub struct Environment {
    pub config: ProvisioningConfig,
    pub db_path: PathBuf,
}

impl Environment {
    /// Load the configuration; an explicit `db_path` wins over it
    pub fn load(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(paths::default_config_path);
        let mut config = ProvisioningConfig::load(&config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?;
        if let Some(db_path) = db_path {
            config.registry.db_path = Some(db_path);
        }
        let db_path = config.db_path();
        debug!("Using profile database {}", db_path.display());
        Ok(Self { config, db_path })
    }

    pub fn open_registry(&self) -> Result<Arc<SqliteProfileRegistry>> {
        let registry = SqliteProfileRegistry::open(&self.db_path.to_string_lossy())
            .with_context(|| format!("Failed to open {}", self.db_path.display()))?;
        Ok(Arc::new(registry))
    }

    /// Planner and engine wired to the registry and configured trust
    pub fn director(&self, registry: Arc<SqliteProfileRegistry>, apply: &ApplyArgs) -> Director {
        let mut engine = Engine::new(registry, self.config.work_dir()).with_trust(
            self.config.trust_settings(),
            Arc::new(self.config.trust_store()),
        );
        engine = engine.with_prompt(Arc::new(StdinPrompt::new(apply.yes)));
        if let Some(ref root) = apply.install_root {
            engine = engine.with_touchpoint(Arc::new(DirectoryTouchpoint::new(root)));
        }
        let planner = Planner::with_search_limit(self.config.planner.search_limit);
        Director::new(planner, Arc::new(engine))
    }
}

/// Repositories, artifacts and filter environment from the command line
pub fn provisioning_context(source: &SourceArgs) -> Result<ProvisioningContext> {
    let mut context = ProvisioningContext::new();
    for path in &source.repos {
        let repo = FileRepository::load(path)
            .with_context(|| format!("Failed to load repository {}", path.display()))?;
        context = context.with_repository(Arc::new(repo));
    }
    if let Some(ref dir) = source.artifacts {
        context = context.with_artifact_source(Arc::new(DirectoryArtifactSource::new(dir)));
    }
    for (name, value) in parse_pairs(&source.environment)? {
        context = context.with_property(&name, &value);
    }
    Ok(context)
}

/// Parse `key=value` arguments
pub fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got '{}'", pair))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn current_profile(registry: &dyn ProfileRegistry, id: &str) -> Result<Arc<Profile>> {
    registry
        .get_profile(id)?
        .ok_or_else(|| anyhow::anyhow!("Profile '{}' does not exist", id))
}

/// Print a status tree unless it is a bare OK
pub fn print_status(status: &Status) {
    if !status.is_ok() {
        println!("{}", status);
    }
}

/// Plan `request`, show the plan, and run it unless this is a dry run
pub fn apply_request(
    env: &Environment,
    registry: Arc<SqliteProfileRegistry>,
    request: &ProfileChangeRequest,
    context: &ProvisioningContext,
    apply: &ApplyArgs,
    operation: &str,
) -> Result<()> {
    let profile_id = request.profile().id().to_string();
    let director = env.director(registry, apply);

    let planning = ProgressBarMonitor::spinner(&format!("Planning changes to {}", profile_id));
    let plan = director
        .planner()
        .get_provisioning_plan(request, context, &planning)
        .context("Failed to compute provisioning plan")?;
    planning.finish();

    if !plan.status.is_success() {
        print_status(&plan.status);
        return Err(anyhow::anyhow!(
            "Cannot change profile '{}': {}",
            profile_id,
            plan.status.severity
        ));
    }
    print_status(&plan.status);

    if plan.is_empty() {
        println!("Nothing to do for profile '{}'", profile_id);
        return Ok(());
    }

    println!("Plan for profile '{}':", profile_id);
    for operand in &plan.operands {
        println!("  {}", operand);
    }

    let phases = if apply.dry_run {
        PhaseSet::sizing()
    } else {
        PhaseSet::default_set()
    };
    let monitor = ProgressBarMonitor::new(operation);
    let status = director
        .engine()
        .perform_plan(&plan, &phases, context, &monitor)
        .context("Failed to run provisioning plan")?;
    monitor.finish();

    if apply.dry_run {
        print_status(&status);
        println!("Dry run: profile '{}' was not changed", profile_id);
        return Ok(());
    }
    if !status.is_success() {
        print_status(&status);
        return Err(anyhow::anyhow!(
            "{} failed for profile '{}': {}",
            operation,
            profile_id,
            status.severity
        ));
    }
    print_status(&status);
    info!("{} complete for profile {}", operation, profile_id);
    println!(
        "Done: {} install(s), {} removal(s) in profile '{}'",
        plan.installs().count(),
        plan.uninstalls().count(),
        profile_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs(&["os = linux".to_string(), "arch=x86_64".to_string()]).unwrap();
        assert_eq!(pairs.get("os").map(String::as_str), Some("linux"));
        assert_eq!(pairs.get("arch").map(String::as_str), Some("x86_64"));
        assert!(parse_pairs(&["nope".to_string()]).is_err());
    }
}
