// src/repository/mod.rs

//! Metadata and artifact repositories
//!
//! The core only needs the read side of a repository: metadata repositories
//! answer [`Query`]s, artifact sources open artifact streams for the collect
//! phase. Transport is out of scope; the provided implementations are
//! in-memory and local-file backed.

pub mod artifact;

pub use artifact::{
    ArtifactDescriptor, ArtifactSource, DirectoryArtifactSource, MemoryArtifactSource,
};

use crate::error::Result;
use crate::metadata::{InstallableUnit, io};
use crate::progress::ProgressMonitor;
use crate::query::{IuCollection, Query, QueryResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Read contract of a metadata repository
pub trait MetadataRepository: Send + Sync {
    /// Display name used in logs
    fn name(&self) -> &str;

    /// Run a query, polling `monitor` for cancellation
    fn query(&self, query: &Query, monitor: &dyn ProgressMonitor) -> Result<QueryResult>;
}

/// Repository held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    name: String,
    units: IuCollection,
}

impl MemoryRepository {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            units: IuCollection::new(),
        }
    }

    pub fn with_units<I>(name: &str, units: I) -> Self
    where
        I: IntoIterator<Item = InstallableUnit>,
    {
        Self {
            name: name.to_string(),
            units: IuCollection::from_units(units.into_iter().map(Arc::new)),
        }
    }

    /// Add a unit; returns false if its key was already present
    pub fn add(&mut self, unit: InstallableUnit) -> bool {
        self.units.insert(Arc::new(unit))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl MetadataRepository for MemoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, query: &Query, monitor: &dyn ProgressMonitor) -> Result<QueryResult> {
        self.units.query(query, monitor)
    }
}

/// Repository loaded from a serialized unit file
#[derive(Debug, Clone)]
pub struct FileRepository {
    name: String,
    path: PathBuf,
    units: IuCollection,
}

impl FileRepository {
    /// Load a repository from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let units = io::load_units(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("repository")
            .to_string();
        info!("Loaded {} units from repository {}", units.len(), path.display());
        Ok(Self {
            name,
            path: path.to_path_buf(),
            units: IuCollection::from_units(units.into_iter().map(Arc::new)),
        })
    }

    /// Write `units` to `path` as a repository file
    pub fn create<'a, I>(path: &Path, units: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a InstallableUnit>,
    {
        io::save_units(path, units)?;
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl MetadataRepository for FileRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, query: &Query, monitor: &dyn ProgressMonitor) -> Result<QueryResult> {
        self.units.query(query, monitor)
    }
}
