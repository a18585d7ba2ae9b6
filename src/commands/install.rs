// src/commands/install.rs
//! Install and remove commands

use super::{Environment, apply_request, current_profile, provisioning_context};
use crate::cli::{ApplyArgs, SourceArgs};
use anyhow::{Context, Result};
use provisioner::director::{ProfileChangeRequest, ProvisioningContext};
use provisioner::metadata::{InstallableUnit, UnitKey};
use provisioner::progress::NullMonitor;
use provisioner::{Profile, Query, VersionRange};
use std::sync::Arc;
use tracing::info;

/// Find the unit named by `selector` in the context
///
/// `id` picks the newest version, `id@version` an exact one.
fn resolve_unit(context: &ProvisioningContext, selector: &str) -> Result<Arc<InstallableUnit>> {
    let query = if selector.contains('@') {
        let key = UnitKey::parse(selector)?;
        Query::id_range(&key.id, VersionRange::exact(key.version))
    } else {
        Query::latest(Query::id(selector))
    };
    context
        .query(&query, &NullMonitor::new())?
        .into_vec()
        .pop()
        .ok_or_else(|| anyhow::anyhow!("No unit matching '{}' in the given repositories", selector))
}

/// Installed units named by `selector`: every version for `id`, one for `id@version`
fn installed_units(profile: &Profile, selector: &str) -> Result<Vec<UnitKey>> {
    let keys: Vec<UnitKey> = if selector.contains('@') {
        let key = UnitKey::parse(selector)?;
        profile.contains(&key).then_some(key).into_iter().collect()
    } else {
        profile
            .units_with_id(selector)
            .into_iter()
            .map(|u| u.key())
            .collect()
    };
    if keys.is_empty() {
        return Err(anyhow::anyhow!(
            "'{}' is not installed in profile '{}'",
            selector,
            profile.id()
        ));
    }
    Ok(keys)
}

/// Install units into a profile
pub fn cmd_install(
    env: &Environment,
    profile_id: &str,
    units: &[String],
    optional: bool,
    source: &SourceArgs,
    apply: &ApplyArgs,
) -> Result<()> {
    info!("Installing {:?} into profile {}", units, profile_id);
    let registry = env.open_registry()?;
    let profile = current_profile(registry.as_ref(), profile_id)?;
    let context = provisioning_context(source)?;

    let mut request = ProfileChangeRequest::new(profile);
    for selector in units {
        let unit = resolve_unit(&context, selector)
            .with_context(|| format!("Failed to resolve '{}'", selector))?;
        if optional {
            request.add_optional(unit);
        } else {
            request.add(unit);
        }
    }

    apply_request(env, registry, &request, &context, apply, "Installing")
}

/// Remove units from a profile
pub fn cmd_remove(
    env: &Environment,
    profile_id: &str,
    units: &[String],
    source: &SourceArgs,
    apply: &ApplyArgs,
) -> Result<()> {
    info!("Removing {:?} from profile {}", units, profile_id);
    let registry = env.open_registry()?;
    let profile = current_profile(registry.as_ref(), profile_id)?;
    let context = provisioning_context(source)?;

    let mut request = ProfileChangeRequest::new(profile.clone());
    for selector in units {
        for key in installed_units(&profile, selector)? {
            request.remove(key);
        }
    }

    apply_request(env, registry, &request, &context, apply, "Removing")
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioner::Version;
    use provisioner::repository::MemoryRepository;

    fn unit(id: &str, version: &str) -> InstallableUnit {
        InstallableUnit::builder(id, Version::parse(version).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_unit_picks_newest_or_exact() {
        let repo = MemoryRepository::with_units(
            "test",
            vec![unit("a", "1.0.0"), unit("a", "2.0.0"), unit("b", "1.0.0")],
        );
        let context = ProvisioningContext::new().with_repository(Arc::new(repo));

        assert_eq!(
            resolve_unit(&context, "a").unwrap().version,
            Version::new(2, 0, 0)
        );
        assert_eq!(
            resolve_unit(&context, "a@1.0.0").unwrap().version,
            Version::new(1, 0, 0)
        );
        assert!(resolve_unit(&context, "c").is_err());
    }

    #[test]
    fn test_installed_units_requires_presence() {
        let mut working = Profile::empty("p").working_copy();
        working.add_unit(Arc::new(unit("a", "1.0.0")));
        working.add_unit(Arc::new(unit("a", "2.0.0")));
        let profile = working.build(1);

        assert_eq!(installed_units(&profile, "a").unwrap().len(), 2);
        assert_eq!(installed_units(&profile, "a@1.0.0").unwrap().len(), 1);
        assert!(installed_units(&profile, "a@3.0.0").is_err());
        assert!(installed_units(&profile, "b").is_err());
    }
}
