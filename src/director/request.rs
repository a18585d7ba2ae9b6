// src/director/request.rs

//! Profile change requests

use crate::metadata::{InstallableUnit, UnitKey};
use crate::profile::Profile;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the caller wants changed in a profile
///
/// Property changes hold `Some(value)` to set and `None` to remove.
#[derive(Debug, Clone)]
pub struct ProfileChangeRequest {
    profile: Arc<Profile>,
    additions: Vec<Arc<InstallableUnit>>,
    optional_additions: Vec<Arc<InstallableUnit>>,
    removals: Vec<UnitKey>,
    unit_properties: BTreeMap<UnitKey, BTreeMap<String, Option<String>>>,
    profile_properties: BTreeMap<String, Option<String>>,
}

impl ProfileChangeRequest {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self {
            profile,
            additions: Vec::new(),
            optional_additions: Vec::new(),
            removals: Vec::new(),
            unit_properties: BTreeMap::new(),
            profile_properties: BTreeMap::new(),
        }
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    /// Require a unit in the resulting profile
    pub fn add(&mut self, unit: Arc<InstallableUnit>) {
        if !self.additions.iter().any(|u| u.key() == unit.key()) {
            self.additions.push(unit);
        }
    }

    pub fn add_all<I>(&mut self, units: I)
    where
        I: IntoIterator<Item = Arc<InstallableUnit>>,
    {
        for unit in units {
            self.add(unit);
        }
    }

    /// Install a unit if it can be, otherwise drop it with a warning
    pub fn add_optional(&mut self, unit: Arc<InstallableUnit>) {
        if !self.optional_additions.iter().any(|u| u.key() == unit.key()) {
            self.optional_additions.push(unit);
        }
    }

    /// Remove an installed unit
    pub fn remove(&mut self, key: UnitKey) {
        if !self.removals.contains(&key) {
            self.removals.push(key);
        }
    }

    /// Replace `old` by `new` (an update)
    pub fn replace(&mut self, old: UnitKey, new: Arc<InstallableUnit>) {
        self.remove(old);
        self.add(new);
    }

    pub fn set_unit_property(&mut self, key: &UnitKey, name: &str, value: &str) {
        self.unit_properties
            .entry(key.clone())
            .or_default()
            .insert(name.to_string(), Some(value.to_string()));
    }

    pub fn remove_unit_property(&mut self, key: &UnitKey, name: &str) {
        self.unit_properties
            .entry(key.clone())
            .or_default()
            .insert(name.to_string(), None);
    }

    pub fn set_profile_property(&mut self, name: &str, value: &str) {
        self.profile_properties
            .insert(name.to_string(), Some(value.to_string()));
    }

    pub fn remove_profile_property(&mut self, name: &str) {
        self.profile_properties.insert(name.to_string(), None);
    }

    pub fn additions(&self) -> &[Arc<InstallableUnit>] {
        &self.additions
    }

    pub fn optional_additions(&self) -> &[Arc<InstallableUnit>] {
        &self.optional_additions
    }

    pub fn removals(&self) -> &[UnitKey] {
        &self.removals
    }

    pub fn unit_property_changes(&self) -> &BTreeMap<UnitKey, BTreeMap<String, Option<String>>> {
        &self.unit_properties
    }

    pub fn profile_property_changes(&self) -> &BTreeMap<String, Option<String>> {
        &self.profile_properties
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
            && self.optional_additions.is_empty()
            && self.removals.is_empty()
            && self.unit_properties.is_empty()
            && self.profile_properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    #[test]
    fn test_duplicates_collapse() {
        let unit = Arc::new(InstallableUnit::builder("a", Version::new(1, 0, 0)).build().unwrap());
        let mut request = ProfileChangeRequest::new(Arc::new(Profile::empty("p")));
        assert!(request.is_empty());
        request.add(unit.clone());
        request.add(unit.clone());
        request.remove(unit.key());
        request.remove(unit.key());
        assert_eq!(request.additions().len(), 1);
        assert_eq!(request.removals().len(), 1);
    }

    #[test]
    fn test_property_changes() {
        let key = UnitKey::new("a", Version::new(1, 0, 0));
        let mut request = ProfileChangeRequest::new(Arc::new(Profile::empty("p")));
        request.set_unit_property(&key, "lock", "1");
        request.remove_profile_property("os");
        assert_eq!(
            request.unit_property_changes()[&key]["lock"],
            Some("1".to_string())
        );
        assert_eq!(request.profile_property_changes()["os"], None);
    }
}
