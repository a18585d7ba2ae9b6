// src/commands/profile.rs
//! Profile management commands

use super::{Environment, current_profile, parse_pairs};
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use provisioner::metadata::UnitKey;
use provisioner::profile::{LockFlags, PROP_LOCK, ProfileRegistry};
use tracing::info;

/// Registry timestamps are milliseconds since the epoch
fn format_timestamp(timestamp: i64) -> String {
    Utc.timestamp_millis_opt(timestamp)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Create an empty profile
pub fn cmd_profile_create(env: &Environment, id: &str, properties: &[String]) -> Result<()> {
    info!("Creating profile {}", id);
    let registry = env.open_registry()?;
    let properties = parse_pairs(properties)?;
    let profile = registry
        .add_profile(id, properties)
        .with_context(|| format!("Failed to create profile '{}'", id))?;
    println!(
        "Created profile '{}' (revision {})",
        profile.id(),
        profile.timestamp()
    );
    Ok(())
}

/// List profiles
pub fn cmd_profile_list(env: &Environment) -> Result<()> {
    let registry = env.open_registry()?;
    let ids = registry.profile_ids()?;
    if ids.is_empty() {
        println!("No profiles");
        return Ok(());
    }
    println!("Profiles:");
    for id in ids {
        let profile = current_profile(registry.as_ref(), &id)?;
        println!(
            "  {} ({} unit(s), updated {})",
            id,
            profile.len(),
            format_timestamp(profile.timestamp())
        );
    }
    Ok(())
}

/// Show the units and properties of a profile
pub fn cmd_profile_show(
    env: &Environment,
    id: &str,
    timestamp: Option<i64>,
    roots_only: bool,
) -> Result<()> {
    let registry = env.open_registry()?;
    let profile = match timestamp {
        Some(ts) => registry
            .get_revision(id, ts)?
            .ok_or_else(|| anyhow::anyhow!("Profile '{}' has no revision {}", id, ts))?,
        None => current_profile(registry.as_ref(), id)?,
    };

    println!(
        "Profile '{}' at revision {} ({})",
        profile.id(),
        profile.timestamp(),
        format_timestamp(profile.timestamp())
    );
    if !profile.properties().is_empty() {
        println!("Properties:");
        for (name, value) in profile.properties() {
            println!("  {} = {}", name, value);
        }
    }

    let units: Vec<_> = profile
        .units()
        .filter(|u| !roots_only || profile.is_root(&u.key()))
        .collect();
    if units.is_empty() {
        println!("No units installed");
        return Ok(());
    }
    println!("Units:");
    for unit in units {
        let key = unit.key();
        let mut marks = Vec::new();
        if profile.is_root(&key) {
            marks.push("root".to_string());
        }
        let locks = profile.lock_flags(&key);
        if !locks.is_none() {
            marks.push(format!("locked: {}", locks));
        }
        if unit.is_patch() {
            marks.push("patch".to_string());
        }
        if marks.is_empty() {
            println!("  {}", key);
        } else {
            println!("  {} [{}]", key, marks.join(", "));
        }
    }
    Ok(())
}

/// List the revisions of a profile
pub fn cmd_profile_history(env: &Environment, id: &str) -> Result<()> {
    let registry = env.open_registry()?;
    let current = current_profile(registry.as_ref(), id)?;
    let revisions = registry.revisions(id)?;
    println!("Revisions of '{}':", id);
    for timestamp in revisions {
        let units = registry
            .get_revision(id, timestamp)?
            .map(|p| p.len())
            .unwrap_or_default();
        let mark = if timestamp == current.timestamp() {
            " (current)"
        } else {
            ""
        };
        println!(
            "  {}  {}  {} unit(s){}",
            timestamp,
            format_timestamp(timestamp),
            units,
            mark
        );
    }
    Ok(())
}

/// Go back to the previous revision
pub fn cmd_profile_revert(env: &Environment, id: &str) -> Result<()> {
    info!("Reverting profile {}", id);
    let registry = env.open_registry()?;
    let profile = registry
        .revert_to_previous(id)
        .with_context(|| format!("Failed to revert profile '{}'", id))?;
    println!(
        "Profile '{}' reverted; now at revision {} with {} unit(s)",
        id,
        profile.timestamp(),
        profile.len()
    );
    Ok(())
}

/// Set or clear the lock flags of an installed unit
pub fn cmd_profile_lock(
    env: &Environment,
    id: &str,
    unit: &str,
    uninstall: bool,
    update: bool,
    clear: bool,
) -> Result<()> {
    let key = UnitKey::parse(unit)?;
    let registry = env.open_registry()?;
    let profile = current_profile(registry.as_ref(), id)?;
    if !profile.contains(&key) {
        return Err(anyhow::anyhow!(
            "'{}' is not installed in profile '{}'",
            key,
            id
        ));
    }

    let mut flags = if clear {
        LockFlags::NONE
    } else {
        profile.lock_flags(&key)
    };
    if uninstall {
        flags = flags.union(LockFlags::UNINSTALL);
    }
    if update {
        flags = flags.union(LockFlags::UPDATE);
    }

    let mut working = profile.working_copy();
    if flags.is_none() {
        working.remove_unit_property(&key, PROP_LOCK);
    } else {
        working.set_unit_property(&key, PROP_LOCK, &flags.bits().to_string());
    }
    if !working.is_changed() {
        println!("{} already has locks: {}", key, flags);
        return Ok(());
    }

    info!("Setting locks of {} in {} to {}", key, id, flags);
    registry.commit(working)?;
    println!("{} locks: {}", key, flags);
    Ok(())
}

/// Delete a profile and its history
pub fn cmd_profile_delete(env: &Environment, id: &str) -> Result<()> {
    info!("Deleting profile {}", id);
    let registry = env.open_registry()?;
    registry
        .remove_profile(id)
        .with_context(|| format!("Failed to delete profile '{}'", id))?;
    println!("Deleted profile '{}'", id);
    Ok(())
}
