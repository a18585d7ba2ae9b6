// src/db/paths.rs
//! Centralized path derivation for provisioner directories

use std::path::{Path, PathBuf};

/// Fallback state directory when no user data directory is known
const FALLBACK_DATA_DIR: &str = "/var/lib/provisioner";

/// Default state directory, honouring `PROVISIONER_DB_DIR`
pub fn data_dir() -> PathBuf {
    std::env::var("PROVISIONER_DB_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .map(|d| d.join("provisioner"))
                .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
        })
}

/// Default profile database path
pub fn default_db_path() -> PathBuf {
    data_dir().join("profiles.db")
}

/// Default configuration file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("provisioner").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("/etc/provisioner/config.toml"))
}

/// Get the directory containing the database
pub fn db_dir(db_path: &str) -> PathBuf {
    Path::new(db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf()
}

/// Advisory lock file guarding registry commits
pub fn lock_path(db_path: &str) -> PathBuf {
    db_dir(db_path).join("registry.lock")
}

/// Scratch space for engine sessions (collected artifacts)
pub fn work_dir(db_path: &str) -> PathBuf {
    db_dir(db_path).join("work")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_dir() {
        assert_eq!(
            db_dir("/var/lib/provisioner/profiles.db"),
            PathBuf::from("/var/lib/provisioner")
        );
        assert_eq!(db_dir("profiles.db"), PathBuf::from("."));
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path("/var/lib/provisioner/profiles.db"),
            PathBuf::from("/var/lib/provisioner/registry.lock")
        );
    }

    #[test]
    fn test_work_dir() {
        assert_eq!(
            work_dir("/srv/state/profiles.db"),
            PathBuf::from("/srv/state/work")
        );
    }
}
