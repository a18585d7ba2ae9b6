// src/profile/registry.rs

//! Profile registries
//!
//! A registry owns the revision history of every profile. Commits append a
//! revision and move the current pointer only once the revision is fully
//! written, so readers always see a whole revision.

use super::{Profile, ProfileBuilder};
use crate::db::{
    self,
    models::{ProfileRow, RevisionReason, RevisionRow},
    paths,
};
use crate::error::{Error, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::File;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Storage contract for profile revisions
pub trait ProfileRegistry: Send + Sync {
    /// Create a profile with an empty first revision
    fn add_profile(&self, id: &str, properties: BTreeMap<String, String>)
    -> Result<Arc<Profile>>;

    /// Current revision, or `None` if the profile does not exist
    fn get_profile(&self, id: &str) -> Result<Option<Arc<Profile>>>;

    /// A specific revision by timestamp
    fn get_revision(&self, id: &str, timestamp: i64) -> Result<Option<Arc<Profile>>>;

    /// Revision timestamps, oldest first
    fn revisions(&self, id: &str) -> Result<Vec<i64>>;

    fn profile_ids(&self) -> Result<Vec<String>>;

    /// Delete a profile and all of its history
    fn remove_profile(&self, id: &str) -> Result<()>;

    /// Append the working copy as a new current revision
    ///
    /// Fails with [`Error::StalePlan`] when the working copy was not based on
    /// the current revision.
    fn commit(&self, working: ProfileBuilder) -> Result<Arc<Profile>>;

    /// Append a copy of the revision preceding the current one
    fn revert_to_previous(&self, id: &str) -> Result<Arc<Profile>>;
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next revision timestamp: wall clock, but strictly after `previous`
fn next_timestamp(previous: i64) -> i64 {
    now_millis().max(previous + 1)
}

fn stale(id: &str, basis: i64, current: i64) -> Error {
    Error::StalePlan(format!(
        "profile '{}' is at revision {} but the change was based on {}",
        id, current, basis
    ))
}

fn missing(id: &str) -> Error {
    Error::NotFoundError(format!("profile '{}'", id))
}

/// In-process registry
#[derive(Debug, Default)]
pub struct MemoryProfileRegistry {
    profiles: RwLock<BTreeMap<String, Vec<Arc<Profile>>>>,
}

impl MemoryProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<Arc<Profile>>>>> {
        self.profiles
            .read()
            .map_err(|_| Error::IoError("profile registry lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<Arc<Profile>>>>> {
        self.profiles
            .write()
            .map_err(|_| Error::IoError("profile registry lock poisoned".to_string()))
    }
}

impl ProfileRegistry for MemoryProfileRegistry {
    fn add_profile(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<Arc<Profile>> {
        let mut profiles = self.write()?;
        if profiles.contains_key(id) {
            return Err(Error::ProfileExists(id.to_string()));
        }
        let profile = Arc::new(Profile::from_parts(
            id,
            now_millis(),
            Vec::new(),
            BTreeMap::new(),
            properties,
        ));
        profiles.insert(id.to_string(), vec![profile.clone()]);
        info!("Created profile {}", id);
        Ok(profile)
    }

    fn get_profile(&self, id: &str) -> Result<Option<Arc<Profile>>> {
        Ok(self.read()?.get(id).and_then(|revs| revs.last().cloned()))
    }

    fn get_revision(&self, id: &str, timestamp: i64) -> Result<Option<Arc<Profile>>> {
        Ok(self.read()?.get(id).and_then(|revs| {
            revs.iter()
                .find(|p| p.timestamp() == timestamp)
                .cloned()
        }))
    }

    fn revisions(&self, id: &str) -> Result<Vec<i64>> {
        let profiles = self.read()?;
        let revs = profiles.get(id).ok_or_else(|| missing(id))?;
        Ok(revs.iter().map(|p| p.timestamp()).collect())
    }

    fn profile_ids(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn remove_profile(&self, id: &str) -> Result<()> {
        self.write()?.remove(id).map(|_| ()).ok_or_else(|| missing(id))
    }

    fn commit(&self, working: ProfileBuilder) -> Result<Arc<Profile>> {
        let mut profiles = self.write()?;
        let id = working.id().to_string();
        let revs = profiles.get_mut(&id).ok_or_else(|| missing(&id))?;
        let current = revs.last().map(|p| p.timestamp()).unwrap_or_default();
        if working.basis_timestamp() != current {
            return Err(stale(&id, working.basis_timestamp(), current));
        }
        let profile = Arc::new(working.build(next_timestamp(current)));
        revs.push(profile.clone());
        debug!("Committed {} revision {}", id, profile.timestamp());
        Ok(profile)
    }

    fn revert_to_previous(&self, id: &str) -> Result<Arc<Profile>> {
        let mut profiles = self.write()?;
        let revs = profiles.get_mut(id).ok_or_else(|| missing(id))?;
        if revs.len() < 2 {
            return Err(Error::NotFoundError(format!(
                "profile '{}' has no previous revision",
                id
            )));
        }
        let previous = revs[revs.len() - 2].clone();
        let current = revs[revs.len() - 1].timestamp();
        let restored = Arc::new(previous.working_copy().build(next_timestamp(current)));
        revs.push(restored.clone());
        info!(
            "Reverted profile {} to the contents of revision {}",
            id,
            previous.timestamp()
        );
        Ok(restored)
    }
}

/// Registry persisted in SQLite
///
/// Commits run in one transaction while holding an advisory lock on
/// `registry.lock` next to the database, so separate processes sharing the
/// database serialize their commits.
pub struct SqliteProfileRegistry {
    db_path: String,
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteProfileRegistry {
    /// Open (creating if needed) the registry database at `db_path`
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = db::init(db_path)?;
        Ok(Self {
            db_path: db_path.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::DatabaseError("registry connection lock poisoned".to_string()))
    }

    /// Take the cross-process commit lock
    fn lock(&self) -> Result<File> {
        let lock_path = paths::lock_path(&self.db_path);
        let lock_file = File::create(&lock_path)?;

        // Tries: 0ms, 100ms, 200ms, 400ms, 800ms
        const MAX_RETRIES: u32 = 5;
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match lock_file.try_lock_exclusive() {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRIES - 1 {
                        let delay = std::time::Duration::from_millis(100 * (1 << attempt));
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        if let Some(e) = last_error {
            return Err(Error::IoError(format!(
                "Failed to acquire registry lock {} after {} retries: {}",
                lock_path.display(),
                MAX_RETRIES,
                e
            )));
        }
        Ok(lock_file)
    }

    /// Write `profile` as the new current revision inside one transaction
    fn append(&self, profile: &Profile, reason: RevisionReason) -> Result<()> {
        let mut row = RevisionRow::from_profile(profile, reason)?;
        row.is_current = true;
        let mut conn = self.conn()?;
        db::transaction(&mut conn, |tx| {
            RevisionRow::clear_current(tx, profile.id())?;
            row.insert(tx)?;
            Ok(())
        })
    }

    fn current_row(&self, id: &str) -> Result<Option<RevisionRow>> {
        let conn = self.conn()?;
        RevisionRow::find_current(&conn, id)
    }
}

impl ProfileRegistry for SqliteProfileRegistry {
    fn add_profile(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<Arc<Profile>> {
        let _lock = self.lock()?;
        let profile = Profile::from_parts(id, now_millis(), Vec::new(), BTreeMap::new(), properties);
        let mut row = RevisionRow::from_profile(&profile, RevisionReason::Create)?;
        row.is_current = true;

        let mut conn = self.conn()?;
        db::transaction(&mut conn, |tx| {
            if ProfileRow::find_by_id(tx, id)?.is_some() {
                return Err(Error::ProfileExists(id.to_string()));
            }
            ProfileRow::new(id).insert(tx)?;
            row.insert(tx)?;
            Ok(())
        })?;
        info!("Created profile {} in {}", id, self.db_path);
        Ok(Arc::new(profile))
    }

    fn get_profile(&self, id: &str) -> Result<Option<Arc<Profile>>> {
        self.current_row(id)?
            .map(|row| row.to_profile().map(Arc::new))
            .transpose()
    }

    fn get_revision(&self, id: &str, timestamp: i64) -> Result<Option<Arc<Profile>>> {
        let conn = self.conn()?;
        RevisionRow::find_by_timestamp(&conn, id, timestamp)?
            .map(|row| row.to_profile().map(Arc::new))
            .transpose()
    }

    fn revisions(&self, id: &str) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        if ProfileRow::find_by_id(&conn, id)?.is_none() {
            return Err(missing(id));
        }
        RevisionRow::list_timestamps(&conn, id)
    }

    fn profile_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        Ok(ProfileRow::list_all(&conn)?
            .into_iter()
            .map(|row| row.id)
            .collect())
    }

    fn remove_profile(&self, id: &str) -> Result<()> {
        let _lock = self.lock()?;
        let conn = self.conn()?;
        if !ProfileRow::delete(&conn, id)? {
            return Err(missing(id));
        }
        info!("Removed profile {}", id);
        Ok(())
    }

    fn commit(&self, working: ProfileBuilder) -> Result<Arc<Profile>> {
        let _lock = self.lock()?;
        let id = working.id().to_string();
        let current = self.current_row(&id)?.ok_or_else(|| missing(&id))?;
        if working.basis_timestamp() != current.timestamp {
            return Err(stale(&id, working.basis_timestamp(), current.timestamp));
        }
        let profile = working.build(next_timestamp(current.timestamp));
        self.append(&profile, RevisionReason::Commit)?;
        debug!("Committed {} revision {}", id, profile.timestamp());
        Ok(Arc::new(profile))
    }

    fn revert_to_previous(&self, id: &str) -> Result<Arc<Profile>> {
        let _lock = self.lock()?;
        let current = self.current_row(id)?.ok_or_else(|| missing(id))?;
        let previous = {
            let conn = self.conn()?;
            RevisionRow::find_before(&conn, id, current.timestamp)?
        }
        .ok_or_else(|| {
            Error::NotFoundError(format!("profile '{}' has no previous revision", id))
        })?;

        let restored = previous
            .to_profile()?
            .working_copy()
            .build(next_timestamp(current.timestamp));
        self.append(&restored, RevisionReason::Revert)?;
        info!(
            "Reverted profile {} to the contents of revision {}",
            id, previous.timestamp
        );
        Ok(Arc::new(restored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InstallableUnit;
    use crate::version::Version;
    use tempfile::TempDir;

    fn unit(id: &str) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::builder(id, Version::new(1, 0, 0)).build().unwrap())
    }

    fn exercise(registry: &dyn ProfileRegistry) {
        let first = registry.add_profile("p", BTreeMap::new()).unwrap();
        assert!(first.is_empty());
        assert!(matches!(
            registry.add_profile("p", BTreeMap::new()),
            Err(Error::ProfileExists(_))
        ));

        let mut working = first.working_copy();
        working.add_unit(unit("a"));
        let second = registry.commit(working).unwrap();
        assert!(second.timestamp() > first.timestamp());
        assert_eq!(second.len(), 1);

        // A working copy based on the first revision is now stale
        let stale_copy = first.working_copy();
        assert!(matches!(
            registry.commit(stale_copy),
            Err(Error::StalePlan(_))
        ));

        let reverted = registry.revert_to_previous("p").unwrap();
        assert!(reverted.is_empty());
        assert!(reverted.timestamp() > second.timestamp());

        let history = registry.revisions("p").unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0] < w[1]));

        let old = registry.get_revision("p", second.timestamp()).unwrap().unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(registry.get_profile("p").unwrap().unwrap().timestamp(), history[2]);
        assert_eq!(registry.profile_ids().unwrap(), vec!["p".to_string()]);

        registry.remove_profile("p").unwrap();
        assert!(registry.get_profile("p").unwrap().is_none());
        assert!(registry.remove_profile("p").is_err());
    }

    #[test]
    fn test_memory_registry() {
        exercise(&MemoryProfileRegistry::new());
    }

    #[test]
    fn test_sqlite_registry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("profiles.db");
        let registry = SqliteProfileRegistry::open(path.to_str().unwrap()).unwrap();
        exercise(&registry);
    }

    #[test]
    fn test_sqlite_registry_persists_across_opens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("profiles.db");
        let path = path.to_str().unwrap();
        {
            let registry = SqliteProfileRegistry::open(path).unwrap();
            let profile = registry.add_profile("p", BTreeMap::new()).unwrap();
            let mut working = profile.working_copy();
            working.add_unit(unit("a"));
            working.set_property("os", "linux");
            registry.commit(working).unwrap();
        }
        let registry = SqliteProfileRegistry::open(path).unwrap();
        let profile = registry.get_profile("p").unwrap().unwrap();
        assert_eq!(profile.len(), 1);
        assert_eq!(profile.property("os"), Some("linux"));
    }

    #[test]
    fn test_revert_without_history_fails() {
        let registry = MemoryProfileRegistry::new();
        registry.add_profile("p", BTreeMap::new()).unwrap();
        assert!(matches!(
            registry.revert_to_previous("p"),
            Err(Error::NotFoundError(_))
        ));
    }
}
