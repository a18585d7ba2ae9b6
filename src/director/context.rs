// src/director/context.rs

//! Provisioning context: where candidate units and artifacts come from

use crate::error::Result;
use crate::metadata::{ArtifactKey, InstallableUnit};
use crate::progress::ProgressMonitor;
use crate::query::{IuCollection, Query, QueryResult};
use crate::repository::{ArtifactSource, MetadataRepository};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Repositories, extra units, and environment for one planning or
/// execution run
#[derive(Clone, Default)]
pub struct ProvisioningContext {
    repositories: Vec<Arc<dyn MetadataRepository>>,
    artifact_sources: Vec<Arc<dyn ArtifactSource>>,
    extra_units: IuCollection,
    environment: BTreeMap<String, String>,
}

impl ProvisioningContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(mut self, repository: Arc<dyn MetadataRepository>) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn with_artifact_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.artifact_sources.push(source);
        self
    }

    /// Units offered to the planner in addition to the repositories
    pub fn with_extra_units<I>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = Arc<InstallableUnit>>,
    {
        for unit in units {
            self.extra_units.insert(unit);
        }
        self
    }

    /// Ambient property used by requirement applicability filters
    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.environment.insert(name.to_string(), value.to_string());
        self
    }

    pub fn repositories(&self) -> &[Arc<dyn MetadataRepository>] {
        &self.repositories
    }

    pub fn artifact_sources(&self) -> &[Arc<dyn ArtifactSource>] {
        &self.artifact_sources
    }

    pub fn extra_units(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.extra_units.iter()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Query every repository, then the extra units
    ///
    /// Results are merged by key; the first source to offer a key wins.
    pub fn query(&self, query: &Query, monitor: &dyn ProgressMonitor) -> Result<QueryResult> {
        let mut merged = IuCollection::new();
        for repository in &self.repositories {
            for unit in repository.query(query, monitor)? {
                merged.insert(unit);
            }
        }
        for unit in self.extra_units.query(query, monitor)? {
            merged.insert(unit);
        }
        // Re-run over the merge so `Latest` holds across sources
        Ok(QueryResult::new(query.perform(merged.iter())))
    }

    /// First artifact source that holds `key`
    pub fn artifact_source(&self, key: &ArtifactKey) -> Result<Option<Arc<dyn ArtifactSource>>> {
        for source in &self.artifact_sources {
            if source.descriptor(key)?.is_some() {
                return Ok(Some(source.clone()));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ProvisioningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningContext")
            .field(
                "repositories",
                &self.repositories.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("artifact_sources", &self.artifact_sources.len())
            .field("extra_units", &self.extra_units.len())
            .field("environment", &self.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullMonitor;
    use crate::repository::{MemoryArtifactSource, MemoryRepository};
    use crate::version::Version;

    fn unit(id: &str, origin: &str) -> InstallableUnit {
        InstallableUnit::builder(id, Version::new(1, 0, 0))
            .property("origin", origin)
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_repository_wins() {
        let first = MemoryRepository::with_units("first", vec![unit("a", "first")]);
        let second = MemoryRepository::with_units("second", vec![unit("a", "second"), unit("b", "second")]);
        let context = ProvisioningContext::new()
            .with_repository(Arc::new(first))
            .with_repository(Arc::new(second))
            .with_extra_units(vec![Arc::new(unit("c", "extra"))]);

        let result = context.query(&Query::All, &NullMonitor::new()).unwrap();
        assert_eq!(result.len(), 3);
        let a = result.iter().find(|u| u.id == "a").unwrap();
        assert_eq!(a.property("origin"), Some("first"));
    }

    #[test]
    fn test_artifact_source_lookup() {
        let key = ArtifactKey::new("binary", "a", Version::new(1, 0, 0));
        let mut source = MemoryArtifactSource::new();
        source.insert(key.clone(), b"x".to_vec());
        let context = ProvisioningContext::new()
            .with_artifact_source(Arc::new(MemoryArtifactSource::new()))
            .with_artifact_source(Arc::new(source));
        assert!(context.artifact_source(&key).unwrap().is_some());
        let missing = ArtifactKey::new("binary", "b", Version::new(1, 0, 0));
        assert!(context.artifact_source(&missing).unwrap().is_none());
    }
}
