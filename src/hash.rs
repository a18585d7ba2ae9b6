// src/hash.rs

//! SHA-256 digests for artifact integrity
//!
//! Artifact descriptors may carry a hex SHA-256 digest; the collect phase
//! hashes what it copies and compares.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Streaming SHA-256 hasher that also counts bytes
#[derive(Default)]
pub struct Hasher {
    inner: Sha256,
    bytes: u64,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes hashed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex digest
    pub fn finalize(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Hex SHA-256 of a byte slice
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a reader to the end, returning `(hex digest, byte count)`
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<(String, u64)> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let bytes = hasher.bytes();
    Ok((hasher.finalize(), bytes))
}

/// Digest mismatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sha256 mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for VerifyError {}

/// Compare a computed digest with an expected one, ignoring hex case
pub fn verify_digest(actual: &str, expected: &str) -> Result<(), VerifyError> {
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(VerifyError {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Hash a file and compare with `expected`
pub fn verify_file(path: &Path, expected: &str) -> io::Result<Result<(), VerifyError>> {
    let mut file = std::fs::File::open(path)?;
    let (actual, _) = hash_reader(&mut file)?;
    Ok(verify_digest(&actual, expected))
}
