// src/commands/repo.rs
//! Repository inspection commands

use anyhow::{Context, Result};
use provisioner::metadata::UnitKey;
use provisioner::progress::NullMonitor;
use provisioner::repository::{FileRepository, MetadataRepository};
use provisioner::Query;
use std::path::{Path, PathBuf};
use tracing::info;

fn load(path: &Path) -> Result<FileRepository> {
    FileRepository::load(path)
        .with_context(|| format!("Failed to load repository {}", path.display()))
}

/// List the units in repository files
pub fn cmd_repo_list(repos: &[PathBuf], latest: bool, id: Option<&str>) -> Result<()> {
    let mut query = match id {
        Some(id) => Query::id(id),
        None => Query::All,
    };
    if latest {
        query = Query::latest(query);
    }

    for path in repos {
        info!("Listing repository {}", path.display());
        let repo = load(path)?;
        let units = repo.query(&query, &NullMonitor::new())?;
        println!("{} ({} of {} unit(s)):", path.display(), units.len(), repo.len());
        for unit in units.iter() {
            let mut notes = Vec::new();
            if unit.is_patch() {
                notes.push("patch");
            }
            if unit.is_singleton() {
                notes.push("singleton");
            }
            if notes.is_empty() {
                println!("  {}", unit.key());
            } else {
                println!("  {} [{}]", unit.key(), notes.join(", "));
            }
        }
    }
    Ok(())
}

/// Show every field of one unit as JSON
pub fn cmd_repo_show(repo: &Path, unit: &str) -> Result<()> {
    let key = UnitKey::parse(unit)?;
    let repository = load(repo)?;
    let found = repository
        .query(&Query::Key(key.clone()), &NullMonitor::new())?
        .into_vec()
        .pop()
        .ok_or_else(|| anyhow::anyhow!("{} is not in {}", key, repo.display()))?;
    println!("{}", serde_json::to_string_pretty(found.as_ref())?);
    Ok(())
}
