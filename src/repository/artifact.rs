// src/repository/artifact.rs

//! Artifact sources for the collect phase
//!
//! An artifact may have a detached signature sidecar; sources expose it so
//! the collect phase can place it next to the collected file, where the
//! trust check looks for it.

use crate::error::Result;
use crate::metadata::ArtifactKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Suffix of detached signature sidecar files
pub const SIGNATURE_SUFFIX: &str = "sig";

/// Size and digest of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub key: ArtifactKey,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Read contract for artifact storage
pub trait ArtifactSource: Send + Sync {
    /// Open an artifact stream, or `None` if this source lacks it
    fn open(&self, key: &ArtifactKey) -> Result<Option<Box<dyn Read + Send>>>;

    /// Descriptor for sizing and integrity checks
    fn descriptor(&self, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>>;

    /// Raw bytes of the detached signature, if any
    fn signature(&self, _key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Suffix of expected-digest sidecar files
pub const DIGEST_SUFFIX: &str = "sha256";

fn sidecar_path(artifact: &Path, suffix: &str) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Path of the signature sidecar for `artifact`
pub fn signature_path(artifact: &Path) -> PathBuf {
    sidecar_path(artifact, SIGNATURE_SUFFIX)
}

/// Artifacts stored as files named by [`ArtifactKey::file_name`]
///
/// A `<file>.sha256` sibling, when present, supplies the expected digest.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSource {
    root: PathBuf,
}

impl DirectoryArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl ArtifactSource for DirectoryArtifactSource {
    fn open(&self, key: &ArtifactKey) -> Result<Option<Box<dyn Read + Send>>> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(Box::new(File::open(path)?)))
    }

    fn descriptor(&self, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        let size = fs::metadata(&path)?.len();
        let digest_path = sidecar_path(&path, DIGEST_SUFFIX);
        let sha256 = if digest_path.is_file() {
            Some(fs::read_to_string(digest_path)?.trim().to_string())
        } else {
            None
        };
        Ok(Some(ArtifactDescriptor {
            key: key.clone(),
            size,
            sha256,
        }))
    }

    fn signature(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        let path = signature_path(&self.path_for(key));
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

#[derive(Debug, Clone)]
struct StoredArtifact {
    content: Vec<u8>,
    signature: Option<Vec<u8>>,
    sha256: Option<String>,
}

/// In-memory artifact store
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactSource {
    artifacts: BTreeMap<ArtifactKey, StoredArtifact>,
}

impl MemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ArtifactKey, content: Vec<u8>) {
        self.artifacts.insert(
            key,
            StoredArtifact {
                content,
                signature: None,
                sha256: None,
            },
        );
    }

    /// Attach a detached signature to a stored artifact
    pub fn set_signature(&mut self, key: &ArtifactKey, signature: Vec<u8>) {
        if let Some(stored) = self.artifacts.get_mut(key) {
            stored.signature = Some(signature);
        }
    }

    /// Declare the digest the artifact is expected to have
    pub fn set_expected_sha256(&mut self, key: &ArtifactKey, digest: &str) {
        if let Some(stored) = self.artifacts.get_mut(key) {
            stored.sha256 = Some(digest.to_string());
        }
    }
}

impl ArtifactSource for MemoryArtifactSource {
    fn open(&self, key: &ArtifactKey) -> Result<Option<Box<dyn Read + Send>>> {
        Ok(self
            .artifacts
            .get(key)
            .map(|a| Box::new(Cursor::new(a.content.clone())) as Box<dyn Read + Send>))
    }

    fn descriptor(&self, key: &ArtifactKey) -> Result<Option<ArtifactDescriptor>> {
        Ok(self.artifacts.get(key).map(|a| ArtifactDescriptor {
            key: key.clone(),
            size: a.content.len() as u64,
            sha256: a.sha256.clone(),
        }))
    }

    fn signature(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        Ok(self.artifacts.get(key).and_then(|a| a.signature.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use tempfile::TempDir;

    fn key() -> ArtifactKey {
        ArtifactKey::new("binary", "tool", Version::new(1, 0, 0))
    }

    #[test]
    fn test_signature_path() {
        assert_eq!(
            signature_path(Path::new("/tmp/a.jar")),
            PathBuf::from("/tmp/a.jar.sig")
        );
    }

    #[test]
    fn test_directory_source() {
        let temp_dir = TempDir::new().unwrap();
        let source = DirectoryArtifactSource::new(temp_dir.path());
        assert!(source.open(&key()).unwrap().is_none());

        let file = temp_dir.path().join(key().file_name());
        fs::write(&file, b"payload").unwrap();
        fs::write(signature_path(&file), b"{}").unwrap();

        let mut content = String::new();
        source
            .open(&key())
            .unwrap()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "payload");
        assert_eq!(source.descriptor(&key()).unwrap().unwrap().size, 7);
        assert_eq!(source.signature(&key()).unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemoryArtifactSource::new();
        source.insert(key(), b"abc".to_vec());
        source.set_expected_sha256(&key(), "deadbeef");
        let desc = source.descriptor(&key()).unwrap().unwrap();
        assert_eq!(desc.size, 3);
        assert_eq!(desc.sha256.as_deref(), Some("deadbeef"));
        assert!(source.signature(&key()).unwrap().is_none());
    }
}
