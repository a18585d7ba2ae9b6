// src/trust/signature.rs
//! Artifact signing
//!
//! Ed25519 detached signatures stored as JSON sidecar files next to the
//! artifact (`<artifact>.sig`). Keys are kept in small TOML key files.

use crate::error::{Error, Result};
use crate::repository::artifact::signature_path;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// The only supported algorithm
pub const ALGORITHM: &str = "ed25519";

/// Signature verification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signature verification failed: {0}")]
    Invalid(String),
}

impl From<SignatureError> for Error {
    fn from(err: SignatureError) -> Self {
        Error::SignatureError(err.to_string())
    }
}

/// Detached signature over an artifact's bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSignature {
    /// Signature algorithm (currently only "ed25519")
    pub algorithm: String,
    /// Base64-encoded signature bytes
    pub signature: String,
    /// Base64-encoded public key of the signer
    pub public_key: String,
    /// Optional key identifier (fingerprint or name)
    #[serde(default)]
    pub key_id: Option<String>,
    /// Timestamp when signed (RFC 3339)
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ArtifactSignature {
    /// Parse a sidecar file's contents
    pub fn from_json(bytes: &[u8]) -> std::result::Result<Self, SignatureError> {
        serde_json::from_slice(bytes)
            .map_err(|e| SignatureError::InvalidFormat(format!("sidecar is not valid JSON: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the signature against `content`
    ///
    /// Only proves that the embedded public key signed the content; whether
    /// that key is trusted is decided by the caller.
    pub fn verify(&self, content: &[u8]) -> std::result::Result<(), SignatureError> {
        if self.algorithm != ALGORITHM {
            return Err(SignatureError::UnsupportedAlgorithm(self.algorithm.clone()));
        }

        let sig_bytes = BASE64.decode(&self.signature).map_err(|e| {
            SignatureError::InvalidFormat(format!("Invalid signature base64: {}", e))
        })?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| SignatureError::InvalidFormat(format!("Invalid signature: {}", e)))?;

        let key_bytes = BASE64.decode(&self.public_key).map_err(|e| {
            SignatureError::InvalidFormat(format!("Invalid public key base64: {}", e))
        })?;
        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidFormat("Public key must be 32 bytes".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_array)
            .map_err(|e| SignatureError::InvalidFormat(format!("Invalid public key: {}", e)))?;

        verifying_key
            .verify_strict(content, &signature)
            .map_err(|e| SignatureError::Invalid(e.to_string()))
    }

    /// Human-readable signer label
    pub fn signer(&self) -> String {
        self.key_id
            .clone()
            .unwrap_or_else(|| self.public_key.clone())
    }
}

/// A signing key pair for artifacts
pub struct SigningKeyPair {
    signing_key: SigningKey,
    key_id: Option<String>,
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            key_id: None,
        }
    }

    /// Set a human-readable key identifier
    pub fn with_key_id(mut self, id: &str) -> Self {
        self.key_id = Some(id.to_string());
        self
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Get the public key as base64
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.verifying_key().as_bytes())
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn sign(&self, content: &[u8]) -> ArtifactSignature {
        let signature = self.signing_key.sign(content);
        ArtifactSignature {
            algorithm: ALGORITHM.to_string(),
            signature: BASE64.encode(signature.to_bytes()),
            public_key: self.public_key_base64(),
            key_id: self.key_id.clone(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Sign a file and write its `.sig` sidecar; returns the sidecar path
    pub fn sign_file(&self, artifact: &Path) -> Result<std::path::PathBuf> {
        let content = fs::read(artifact)?;
        let sidecar = signature_path(artifact);
        fs::write(&sidecar, self.sign(&content).to_json()?)?;
        Ok(sidecar)
    }

    /// Save the key pair to files (private and public)
    pub fn save_to_files(&self, private_path: &Path, public_path: &Path) -> Result<()> {
        let private_data = KeyFile {
            algorithm: ALGORITHM.to_string(),
            key: BASE64.encode(self.signing_key.to_bytes()),
            key_id: self.key_id.clone(),
        };
        write_key_file(private_path, &private_data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)?;
        }

        let public_data = KeyFile {
            algorithm: ALGORITHM.to_string(),
            key: self.public_key_base64(),
            key_id: self.key_id.clone(),
        };
        write_key_file(public_path, &public_data)
    }

    /// Load a key pair from a private key file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let key_file = read_key_file(path)?;
        let key_bytes = BASE64
            .decode(&key_file.key)
            .map_err(|e| Error::SignatureError(format!("{}: invalid base64: {}", path.display(), e)))?;
        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| Error::SignatureError(format!("{}: invalid key length", path.display())))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_array),
            key_id: key_file.key_id,
        })
    }
}

/// Key file format
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    key: String,
    #[serde(default)]
    key_id: Option<String>,
}

fn write_key_file(path: &Path, key_file: &KeyFile) -> Result<()> {
    let content = toml::to_string_pretty(key_file)
        .map_err(|e| Error::Serialization(format!("key file: {}", e)))?;
    fs::write(path, content)
        .map_err(|e| Error::IoError(format!("Failed to write key {}: {}", path.display(), e)))
}

fn read_key_file(path: &Path) -> Result<KeyFile> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read key {}: {}", path.display(), e)))?;
    let key_file: KeyFile = toml::from_str(&content)?;
    if key_file.algorithm != ALGORITHM {
        return Err(Error::SignatureError(format!(
            "Unsupported key algorithm: {}",
            key_file.algorithm
        )));
    }
    Ok(key_file)
}

/// Load a base64 public key from a key file (for the trust store)
pub fn load_public_key(path: &Path) -> Result<String> {
    Ok(read_key_file(path)?.key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sign_and_verify() {
        let keypair = SigningKeyPair::generate().with_key_id("test-key");
        let signature = keypair.sign(b"artifact bytes");
        assert_eq!(signature.algorithm, ALGORITHM);
        assert_eq!(signature.signer(), "test-key");
        signature.verify(b"artifact bytes").unwrap();
        assert!(matches!(
            signature.verify(b"tampered bytes"),
            Err(SignatureError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_sidecar() {
        assert!(matches!(
            ArtifactSignature::from_json(b"not json"),
            Err(SignatureError::InvalidFormat(_))
        ));
        let mut signature = SigningKeyPair::generate().sign(b"x");
        signature.algorithm = "rsa".to_string();
        assert!(matches!(
            signature.verify(b"x"),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_sign_file_writes_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("tool_1.0.0");
        fs::write(&artifact, b"payload").unwrap();

        let keypair = SigningKeyPair::generate();
        let sidecar = keypair.sign_file(&artifact).unwrap();
        assert_eq!(sidecar, signature_path(&artifact));

        let parsed = ArtifactSignature::from_json(&fs::read(&sidecar).unwrap()).unwrap();
        parsed.verify(b"payload").unwrap();
        assert_eq!(parsed.public_key, keypair.public_key_base64());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let private_path = temp_dir.path().join("key.private");
        let public_path = temp_dir.path().join("key.public");

        let keypair = SigningKeyPair::generate().with_key_id("test-key");
        keypair.save_to_files(&private_path, &public_path).unwrap();

        let loaded = SigningKeyPair::load_from_file(&private_path).unwrap();
        assert_eq!(loaded.public_key_base64(), keypair.public_key_base64());
        assert_eq!(loaded.key_id(), Some("test-key"));
        assert_eq!(
            load_public_key(&public_path).unwrap(),
            keypair.public_key_base64()
        );
    }
}
