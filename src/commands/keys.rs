// src/commands/keys.rs
//! Signing key commands

use anyhow::{Context, Result};
use provisioner::trust::SigningKeyPair;
use std::path::{Path, PathBuf};
use tracing::info;

fn public_key_path(private_path: &Path) -> PathBuf {
    let mut name = private_path.as_os_str().to_os_string();
    name.push(".pub");
    PathBuf::from(name)
}

/// Generate an Ed25519 key pair
pub fn cmd_keygen(output: &Path, key_id: Option<&str>) -> Result<()> {
    let mut keypair = SigningKeyPair::generate();
    if let Some(id) = key_id {
        keypair = keypair.with_key_id(id);
    }
    let public_path = public_key_path(output);
    keypair
        .save_to_files(output, &public_path)
        .with_context(|| format!("Failed to save key pair to {}", output.display()))?;

    info!("Generated signing key {}", output.display());
    println!("Private key: {}", output.display());
    println!("Public key:  {}", public_path.display());
    println!();
    println!("To trust artifacts signed with this key, add it to the config:");
    println!("  [trust]");
    println!("  trusted_keys = [\"{}\"]", keypair.public_key_base64());
    Ok(())
}

/// Write `.sig` sidecars for artifacts
pub fn cmd_sign(key: &Path, artifacts: &[PathBuf]) -> Result<()> {
    let keypair = SigningKeyPair::load_from_file(key)
        .with_context(|| format!("Failed to load signing key {}", key.display()))?;
    for artifact in artifacts {
        let sidecar = keypair
            .sign_file(artifact)
            .with_context(|| format!("Failed to sign {}", artifact.display()))?;
        println!("Signed {} -> {}", artifact.display(), sidecar.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioner::trust::signature::load_public_key;
    use tempfile::TempDir;

    #[test]
    fn test_keygen_then_sign() {
        let temp = TempDir::new().unwrap();
        let key = temp.path().join("test.key");
        cmd_keygen(&key, Some("test")).unwrap();
        assert!(public_key_path(&key).exists());
        assert!(!load_public_key(&public_key_path(&key)).unwrap().is_empty());

        let artifact = temp.path().join("a.bin");
        std::fs::write(&artifact, b"payload").unwrap();
        cmd_sign(&key, std::slice::from_ref(&artifact)).unwrap();
        assert!(temp.path().join("a.bin.sig").exists());
    }
}
