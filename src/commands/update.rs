// src/commands/update.rs
//! Update commands

use super::{Environment, apply_request, current_profile, provisioning_context};
use crate::cli::{ApplyArgs, SourceArgs};
use anyhow::Result;
use provisioner::director::ProfileChangeRequest;
use provisioner::director::updates::latest_update;
use provisioner::metadata::InstallableUnit;
use provisioner::progress::NullMonitor;
use provisioner::{Planner, Profile};
use std::sync::Arc;
use tracing::info;

/// Installed units selected by id; all of them when `ids` is empty
fn selected_units(profile: &Profile, ids: &[String]) -> Result<Vec<Arc<InstallableUnit>>> {
    if ids.is_empty() {
        return Ok(profile.units().cloned().collect());
    }
    let mut selected = Vec::new();
    for id in ids {
        let units = profile.units_with_id(id);
        if units.is_empty() {
            return Err(anyhow::anyhow!(
                "'{}' is not installed in profile '{}'",
                id,
                profile.id()
            ));
        }
        selected.extend(units.into_iter().cloned());
    }
    Ok(selected)
}

/// Update installed units to their newest versions
pub fn cmd_update(
    env: &Environment,
    profile_id: &str,
    ids: &[String],
    patches: bool,
    source: &SourceArgs,
    apply: &ApplyArgs,
) -> Result<()> {
    info!("Updating profile {}", profile_id);
    let registry = env.open_registry()?;
    let profile = current_profile(registry.as_ref(), profile_id)?;
    let context = provisioning_context(source)?;
    let planner = Planner::with_search_limit(env.config.planner.search_limit);
    let monitor = NullMonitor::new();

    let mut request = ProfileChangeRequest::new(profile.clone());
    let mut changes = 0;
    for unit in selected_units(&profile, ids)? {
        let updates = planner.updates_for(&unit, &context, &monitor)?;
        if let Some(newest) = latest_update(&updates) {
            println!("  {} -> {}", unit.key(), newest.version);
            request.replace(unit.key(), newest);
            changes += 1;
        }
        if patches {
            for patch in updates.iter().filter(|u| u.is_patch()) {
                if !profile.contains(&patch.key()) {
                    println!("  {} patched by {}", unit.key(), patch.key());
                    request.add(patch.clone());
                    changes += 1;
                }
            }
        }
    }

    if changes == 0 {
        println!("Profile '{}' is up to date", profile_id);
        return Ok(());
    }
    apply_request(env, registry, &request, &context, apply, "Updating")
}

/// List available updates without changing anything
pub fn cmd_updates(env: &Environment, profile_id: &str, source: &SourceArgs) -> Result<()> {
    let registry = env.open_registry()?;
    let profile = current_profile(registry.as_ref(), profile_id)?;
    let context = provisioning_context(source)?;
    let planner = Planner::with_search_limit(env.config.planner.search_limit);
    let monitor = NullMonitor::new();

    let mut found = 0;
    for unit in profile.units() {
        let updates = planner.updates_for(unit, &context, &monitor)?;
        if updates.is_empty() {
            continue;
        }
        found += updates.len();
        println!("{}:", unit.key());
        for update in &updates {
            let kind = if update.is_patch() { "patch" } else { "update" };
            println!("  {} ({})", update.key(), kind);
        }
    }

    if found == 0 {
        println!("No updates available for profile '{}'", profile_id);
    } else {
        println!("{} update(s) available", found);
    }
    Ok(())
}
