// src/director/updates.rs

//! Update discovery

use super::context::ProvisioningContext;
use crate::error::Result;
use crate::metadata::InstallableUnit;
use crate::progress::ProgressMonitor;
use crate::query::Query;
use std::sync::Arc;
use tracing::debug;

/// Every unit in the context that is an update of `unit`, sorted by key
///
/// Covers both descriptor-based updates (strictly newer) and patches whose
/// lifecycle `unit` meets.
pub fn updates_for(
    unit: &Arc<InstallableUnit>,
    context: &ProvisioningContext,
    monitor: &dyn ProgressMonitor,
) -> Result<Vec<Arc<InstallableUnit>>> {
    let updates = context
        .query(&Query::updates_of(unit.clone()), monitor)?
        .into_vec();
    debug!("{} update(s) found for {}", updates.len(), unit.key());
    Ok(updates)
}

/// Highest-versioned non-patch update per installed unit
pub fn latest_update(updates: &[Arc<InstallableUnit>]) -> Option<Arc<InstallableUnit>> {
    updates
        .iter()
        .filter(|u| !u.is_patch())
        .max_by(|a, b| a.version.cmp(&b.version).then_with(|| b.id.cmp(&a.id)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::UpdateDescriptor;
    use crate::progress::NullMonitor;
    use crate::repository::MemoryRepository;
    use crate::version::{Version, VersionRange};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_only_strictly_newer() {
        let installed = Arc::new(InstallableUnit::builder("a", v("1.0.0")).build().unwrap());
        let same = InstallableUnit::builder("a", v("1.0.0"))
            .update_descriptor(UpdateDescriptor::new("a", VersionRange::any()))
            .build()
            .unwrap();
        let newer = InstallableUnit::builder("a", v("2.0.0"))
            .update_descriptor(UpdateDescriptor::new("a", VersionRange::parse("[0.0.0,2.0.0)").unwrap()))
            .build()
            .unwrap();
        let repo = MemoryRepository::with_units("r", vec![same, newer]);
        let context = ProvisioningContext::new().with_repository(Arc::new(repo));

        let updates = updates_for(&installed, &context, &NullMonitor::new()).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].version, v("2.0.0"));
        assert_eq!(latest_update(&updates).unwrap().version, v("2.0.0"));
    }
}
