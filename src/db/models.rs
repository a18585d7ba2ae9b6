// src/db/models.rs

//! Data models for profile storage
//!
//! Rows map one-to-one onto the `profiles` and `profile_revisions` tables.
//! Revision payloads are stored as text: units in the checksummed unit-set
//! format, properties as JSON.

use crate::error::{Error, Result};
use crate::metadata::{InstallableUnit, UnitKey, io};
use crate::profile::Profile;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Why a revision was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionReason {
    /// Profile creation
    Create,
    /// Engine commit of a plan
    Commit,
    /// Copy of an earlier revision
    Revert,
}

impl RevisionReason {
    pub fn as_str(&self) -> &str {
        match self {
            RevisionReason::Create => "create",
            RevisionReason::Commit => "commit",
            RevisionReason::Revert => "revert",
        }
    }
}

impl FromStr for RevisionReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(RevisionReason::Create),
            "commit" => Ok(RevisionReason::Commit),
            "revert" => Ok(RevisionReason::Revert),
            _ => Err(format!("Invalid revision reason: {s}")),
        }
    }
}

/// A row of the `profiles` table
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: String,
    pub created_at: Option<String>,
}

impl ProfileRow {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: None,
        }
    }

    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute("INSERT INTO profiles (id) VALUES (?1)", [&self.id])?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT id, created_at FROM profiles WHERE id = ?1")?;
        let row = stmt.query_row([id], Self::from_row).optional()?;
        Ok(row)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT id, created_at FROM profiles ORDER BY id")?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete a profile and, by cascade, all its revisions
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM profiles WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UnitPropertyEntry {
    unit: UnitKey,
    properties: BTreeMap<String, String>,
}

/// A row of the `profile_revisions` table
#[derive(Debug, Clone)]
pub struct RevisionRow {
    pub id: Option<i64>,
    pub profile_id: String,
    pub timestamp: i64,
    pub units: String,
    pub unit_properties: String,
    pub properties: String,
    pub is_current: bool,
    pub reason: RevisionReason,
    pub created_at: Option<String>,
}

const REVISION_COLUMNS: &str =
    "id, profile_id, timestamp, units, unit_properties, properties, is_current, reason, created_at";

impl RevisionRow {
    /// Encode a profile revision for storage
    pub fn from_profile(profile: &Profile, reason: RevisionReason) -> Result<Self> {
        let mut units = Vec::new();
        io::write_units(&mut units, profile.units().map(|u| u.as_ref()))?;
        let units = String::from_utf8(units)
            .map_err(|e| Error::Serialization(format!("unit set is not UTF-8: {}", e)))?;

        let entries: Vec<UnitPropertyEntry> = profile
            .all_unit_properties()
            .iter()
            .map(|(unit, properties)| UnitPropertyEntry {
                unit: unit.clone(),
                properties: properties.clone(),
            })
            .collect();

        Ok(Self {
            id: None,
            profile_id: profile.id().to_string(),
            timestamp: profile.timestamp(),
            units,
            unit_properties: serde_json::to_string(&entries)?,
            properties: serde_json::to_string(profile.properties())?,
            is_current: false,
            reason,
            created_at: None,
        })
    }

    /// Decode the stored payload back into a profile
    pub fn to_profile(&self) -> Result<Profile> {
        let units: Vec<Arc<InstallableUnit>> = io::read_units(self.units.as_bytes())?
            .into_iter()
            .map(Arc::new)
            .collect();
        let entries: Vec<UnitPropertyEntry> = serde_json::from_str(&self.unit_properties)
            .map_err(|e| {
                Error::Deserialization(format!(
                    "revision {}@{}: unit properties: {}",
                    self.profile_id, self.timestamp, e
                ))
            })?;
        let properties: BTreeMap<String, String> = serde_json::from_str(&self.properties)
            .map_err(|e| {
                Error::Deserialization(format!(
                    "revision {}@{}: properties: {}",
                    self.profile_id, self.timestamp, e
                ))
            })?;

        Ok(Profile::from_parts(
            &self.profile_id,
            self.timestamp,
            units,
            entries.into_iter().map(|e| (e.unit, e.properties)).collect(),
            properties,
        ))
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO profile_revisions (profile_id, timestamp, units, unit_properties, properties, is_current, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.profile_id,
                self.timestamp,
                &self.units,
                &self.unit_properties,
                &self.properties,
                self.is_current,
                self.reason.as_str(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Current revision of a profile
    pub fn find_current(conn: &Connection, profile_id: &str) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {} FROM profile_revisions WHERE profile_id = ?1 AND is_current = 1",
            REVISION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt.query_row([profile_id], Self::from_row).optional()?;
        Ok(row)
    }

    pub fn find_by_timestamp(
        conn: &Connection,
        profile_id: &str,
        timestamp: i64,
    ) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {} FROM profile_revisions WHERE profile_id = ?1 AND timestamp = ?2",
            REVISION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row(params![profile_id, timestamp], Self::from_row)
            .optional()?;
        Ok(row)
    }

    /// Latest revision strictly older than `timestamp`
    pub fn find_before(
        conn: &Connection,
        profile_id: &str,
        timestamp: i64,
    ) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {} FROM profile_revisions WHERE profile_id = ?1 AND timestamp < ?2
             ORDER BY timestamp DESC LIMIT 1",
            REVISION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row(params![profile_id, timestamp], Self::from_row)
            .optional()?;
        Ok(row)
    }

    /// Revision timestamps of a profile, oldest first
    pub fn list_timestamps(conn: &Connection, profile_id: &str) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT timestamp FROM profile_revisions WHERE profile_id = ?1 ORDER BY timestamp",
        )?;
        let rows = stmt
            .query_map([profile_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(rows)
    }

    /// Clear the current marker for a profile
    pub fn clear_current(conn: &Connection, profile_id: &str) -> Result<()> {
        conn.execute(
            "UPDATE profile_revisions SET is_current = 0 WHERE profile_id = ?1 AND is_current = 1",
            [profile_id],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let reason: String = row.get(7)?;
        let reason = reason.parse::<RevisionReason>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: row.get(0)?,
            profile_id: row.get(1)?,
            timestamp: row.get(2)?,
            units: row.get(3)?,
            unit_properties: row.get(4)?,
            properties: row.get(5)?,
            is_current: row.get(6)?,
            reason,
            created_at: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::profile::PROP_ROOT;
    use crate::version::Version;

    fn sample_profile() -> Profile {
        let a = Arc::new(
            InstallableUnit::builder("a", Version::new(1, 0, 0))
                .build()
                .unwrap(),
        );
        let mut working = Profile::empty("p").working_copy();
        working.add_unit(a.clone());
        working.set_unit_property(&a.key(), PROP_ROOT, "true");
        working.set_property("os", "linux");
        working.build(42)
    }

    #[test]
    fn test_revision_payload_survives_storage() {
        let conn = db::open_in_memory().unwrap();
        ProfileRow::new("p").insert(&conn).unwrap();

        let profile = sample_profile();
        let mut row = RevisionRow::from_profile(&profile, RevisionReason::Commit).unwrap();
        row.is_current = true;
        row.insert(&conn).unwrap();

        let stored = RevisionRow::find_current(&conn, "p").unwrap().unwrap();
        assert_eq!(stored.reason, RevisionReason::Commit);
        assert_eq!(stored.to_profile().unwrap(), profile);
    }

    #[test]
    fn test_empty_profile_payload() {
        let profile = Profile::empty("p");
        let row = RevisionRow::from_profile(&profile, RevisionReason::Create).unwrap();
        let restored = row.to_profile().unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.id(), "p");
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let profile = sample_profile();
        let mut row = RevisionRow::from_profile(&profile, RevisionReason::Commit).unwrap();
        row.units = row.units.lines().next().unwrap().to_string();
        assert!(matches!(row.to_profile(), Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_delete_cascades() {
        let conn = db::open_in_memory().unwrap();
        ProfileRow::new("p").insert(&conn).unwrap();
        let mut row =
            RevisionRow::from_profile(&Profile::empty("p"), RevisionReason::Create).unwrap();
        row.insert(&conn).unwrap();
        assert!(ProfileRow::delete(&conn, "p").unwrap());
        assert!(RevisionRow::list_timestamps(&conn, "p").unwrap().is_empty());
    }
}
