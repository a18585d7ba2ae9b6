// src/error.rs

//! Error types for the provisioning core
//!
//! Infrastructure failures (I/O, storage, corrupt serialized data, bad
//! configuration) are reported through [`Error`]. Planning and execution
//! problems are not errors: they travel inside a [`crate::status::Status`].

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Profile already exists: {0}")]
    ProfileExists(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Signature error: {0}")]
    SignatureError(String),

    #[error("Checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Touchpoint error: {0}")]
    TouchpointError(String),

    #[error("Stale plan: {0}")]
    StalePlan(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;
