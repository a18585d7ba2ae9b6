// src/profile/mod.rs

//! Installed-state profiles
//!
//! A [`Profile`] is one immutable revision: the installed units, their
//! per-unit properties (lock flags, root markers), and profile-level
//! properties. Changes go through a [`ProfileBuilder`] working copy and are
//! committed to a [`ProfileRegistry`] as a new revision; revisions are never
//! edited in place.

mod registry;

pub use registry::{MemoryProfileRegistry, ProfileRegistry, SqliteProfileRegistry};

use crate::error::{Error, Result};
use crate::metadata::{InstallableUnit, UnitKey};
use crate::query::IuCollection;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Unit property marking a unit the user asked for explicitly
pub const PROP_ROOT: &str = "root";

/// Unit property holding [`LockFlags`] as a decimal integer
pub const PROP_LOCK: &str = "lock";

/// Per-unit lock bit flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockFlags(u32);

impl LockFlags {
    pub const NONE: LockFlags = LockFlags(0);
    /// The unit may not be removed
    pub const UNINSTALL: LockFlags = LockFlags(1);
    /// The unit may not be replaced by another version
    pub const UPDATE: LockFlags = LockFlags(2);

    pub fn from_bits(bits: u32) -> Self {
        LockFlags(bits & 0b11)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: LockFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn union(self, other: LockFlags) -> Self {
        LockFlags(self.0 | other.0)
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Parse the stored property value; garbage reads as no lock
    pub fn from_property(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse::<u32>().ok())
            .map(Self::from_bits)
            .unwrap_or_default()
    }

    /// Parse a user-facing name list: `none`, `uninstall`, `update`, `all`
    pub fn parse(s: &str) -> Result<Self> {
        let mut flags = LockFlags::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            flags = flags.union(match part {
                "none" => LockFlags::NONE,
                "uninstall" => LockFlags::UNINSTALL,
                "update" => LockFlags::UPDATE,
                "all" => LockFlags::UNINSTALL.union(LockFlags::UPDATE),
                other => {
                    return Err(Error::ParseError(format!("unknown lock flag '{}'", other)));
                }
            });
        }
        Ok(flags)
    }
}

impl fmt::Display for LockFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(LockFlags::UNINSTALL) {
            names.push("uninstall");
        }
        if self.contains(LockFlags::UPDATE) {
            names.push("update");
        }
        if names.is_empty() {
            names.push("none");
        }
        write!(f, "{}", names.join(","))
    }
}

/// One immutable profile revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    id: String,
    timestamp: i64,
    units: BTreeMap<UnitKey, Arc<InstallableUnit>>,
    unit_properties: BTreeMap<UnitKey, BTreeMap<String, String>>,
    properties: BTreeMap<String, String>,
}

impl Profile {
    /// An empty profile with no revision yet
    pub fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            timestamp: 0,
            units: BTreeMap::new(),
            unit_properties: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    pub(crate) fn from_parts(
        id: &str,
        timestamp: i64,
        units: impl IntoIterator<Item = Arc<InstallableUnit>>,
        unit_properties: BTreeMap<UnitKey, BTreeMap<String, String>>,
        properties: BTreeMap<String, String>,
    ) -> Self {
        let units: BTreeMap<UnitKey, Arc<InstallableUnit>> =
            units.into_iter().map(|u| (u.key(), u)).collect();
        let unit_properties = unit_properties
            .into_iter()
            .filter(|(key, props)| units.contains_key(key) && !props.is_empty())
            .collect();
        Self {
            id: id.to_string(),
            timestamp,
            units,
            unit_properties,
            properties,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Revision timestamp in milliseconds since the epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Installed units in key order
    pub fn units(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.units.values()
    }

    pub fn unit(&self, key: &UnitKey) -> Option<&Arc<InstallableUnit>> {
        self.units.get(key)
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.units.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Installed units with a given id
    pub fn units_with_id(&self, id: &str) -> Vec<&Arc<InstallableUnit>> {
        self.units.values().filter(|u| u.id == id).collect()
    }

    pub fn unit_properties(&self, key: &UnitKey) -> Option<&BTreeMap<String, String>> {
        self.unit_properties.get(key)
    }

    pub fn all_unit_properties(&self) -> &BTreeMap<UnitKey, BTreeMap<String, String>> {
        &self.unit_properties
    }

    pub fn unit_property(&self, key: &UnitKey, name: &str) -> Option<&str> {
        self.unit_properties
            .get(key)
            .and_then(|props| props.get(name))
            .map(String::as_str)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn lock_flags(&self, key: &UnitKey) -> LockFlags {
        LockFlags::from_property(self.unit_property(key, PROP_LOCK))
    }

    pub fn is_root(&self, key: &UnitKey) -> bool {
        self.unit_property(key, PROP_ROOT) == Some("true")
    }

    /// Installed units as an indexed pool
    pub fn to_collection(&self) -> IuCollection {
        IuCollection::from_units(self.units.values().cloned())
    }

    /// Start a working copy based on this revision
    pub fn working_copy(&self) -> ProfileBuilder {
        ProfileBuilder {
            basis: self.clone(),
            units: self.units.clone(),
            unit_properties: self.unit_properties.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Mutable working copy of a profile, committed as a new revision
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    basis: Profile,
    units: BTreeMap<UnitKey, Arc<InstallableUnit>>,
    unit_properties: BTreeMap<UnitKey, BTreeMap<String, String>>,
    properties: BTreeMap<String, String>,
}

impl ProfileBuilder {
    pub fn id(&self) -> &str {
        &self.basis.id
    }

    /// Timestamp of the revision this copy started from
    pub fn basis_timestamp(&self) -> i64 {
        self.basis.timestamp
    }

    pub fn basis(&self) -> &Profile {
        &self.basis
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.units.contains_key(key)
    }

    pub fn add_unit(&mut self, unit: Arc<InstallableUnit>) {
        self.units.insert(unit.key(), unit);
    }

    /// Remove a unit together with its unit properties
    pub fn remove_unit(&mut self, key: &UnitKey) -> Option<Arc<InstallableUnit>> {
        self.unit_properties.remove(key);
        self.units.remove(key)
    }

    pub fn set_unit_property(&mut self, key: &UnitKey, name: &str, value: &str) {
        self.unit_properties
            .entry(key.clone())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_unit_property(&mut self, key: &UnitKey, name: &str) {
        if let Some(props) = self.unit_properties.get_mut(key) {
            props.remove(name);
            if props.is_empty() {
                self.unit_properties.remove(key);
            }
        }
    }

    pub fn set_property(&mut self, name: &str, value: &str) {
        self.properties.insert(name.to_string(), value.to_string());
    }

    pub fn remove_property(&mut self, name: &str) {
        self.properties.remove(name);
    }

    /// Whether anything differs from the basis revision
    pub fn is_changed(&self) -> bool {
        self.units != self.basis.units
            || self.properties != self.basis.properties
            || self.effective_unit_properties() != self.basis.unit_properties
    }

    fn effective_unit_properties(&self) -> BTreeMap<UnitKey, BTreeMap<String, String>> {
        self.unit_properties
            .iter()
            .filter(|(key, props)| self.units.contains_key(*key) && !props.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Freeze the working copy as a revision with the given timestamp
    pub fn build(self, timestamp: i64) -> Profile {
        Profile::from_parts(
            &self.basis.id,
            timestamp,
            self.units.into_values(),
            self.unit_properties,
            self.properties,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn unit(id: &str) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::builder(id, Version::new(1, 0, 0)).build().unwrap())
    }

    #[test]
    fn test_lock_flags() {
        let both = LockFlags::UNINSTALL.union(LockFlags::UPDATE);
        assert!(both.contains(LockFlags::UNINSTALL));
        assert!(both.contains(LockFlags::UPDATE));
        assert!(!LockFlags::UPDATE.contains(LockFlags::UNINSTALL));
        assert!(!both.contains(LockFlags::NONE));
        assert_eq!(LockFlags::from_property(Some("3")), both);
        assert_eq!(LockFlags::from_property(Some("junk")), LockFlags::NONE);
        assert_eq!(LockFlags::parse("uninstall,update").unwrap(), both);
        assert_eq!(both.to_string(), "uninstall,update");
        assert!(LockFlags::parse("bogus").is_err());
    }

    #[test]
    fn test_working_copy_does_not_touch_basis() {
        let profile = Profile::empty("p");
        let mut working = profile.working_copy();
        let a = unit("a");
        working.add_unit(a.clone());
        working.set_unit_property(&a.key(), PROP_ROOT, "true");
        assert!(working.is_changed());
        assert!(profile.is_empty());

        let next = working.build(10);
        assert_eq!(next.timestamp(), 10);
        assert!(next.is_root(&a.key()));
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_remove_unit_drops_properties() {
        let a = unit("a");
        let mut working = Profile::empty("p").working_copy();
        working.add_unit(a.clone());
        working.set_unit_property(&a.key(), PROP_LOCK, "1");
        let with_a = working.build(1);
        assert_eq!(with_a.lock_flags(&a.key()), LockFlags::UNINSTALL);

        let mut working = with_a.working_copy();
        working.remove_unit(&a.key());
        let without = working.build(2);
        assert!(without.unit_properties(&a.key()).is_none());
        assert!(!without.contains(&a.key()));
    }

    #[test]
    fn test_property_only_change_detected() {
        let profile = Profile::empty("p");
        let mut working = profile.working_copy();
        assert!(!working.is_changed());
        working.set_property("os", "linux");
        assert!(working.is_changed());
    }
}
