// src/metadata/unit.rs

//! Installable units
//!
//! Units are immutable once built and shared as `Arc<InstallableUnit>`.
//! [`UnitKey`] `(id, version)` is the identity used for indexing and
//! de-duplication; the derived `PartialEq` compares full content and is only
//! used where content matters (tests and diagnostics).

use super::capability::{NAMESPACE_IU_ID, ProvidedCapability, Requirement, RequirementChange};
use crate::error::{Error, Result};
use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Unit property flagging a patch
pub const PROP_PATCH: &str = "patch";

/// Unit property holding a human-readable name
pub const PROP_NAME: &str = "name";

/// Identity of a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub id: String,
    pub version: Version,
}

impl UnitKey {
    pub fn new(id: &str, version: Version) -> Self {
        Self {
            id: id.to_string(),
            version,
        }
    }

    /// Parse `id@version`
    pub fn parse(s: &str) -> Result<Self> {
        let (id, version) = s
            .split_once('@')
            .ok_or_else(|| Error::ParseError(format!("expected id@version, got '{}'", s)))?;
        if id.trim().is_empty() {
            return Err(Error::ParseError(format!("empty unit id in '{}'", s)));
        }
        Ok(Self::new(id.trim(), Version::parse(version)?))
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

impl FromStr for UnitKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Key of an artifact a unit needs at install time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub classifier: String,
    pub id: String,
    pub version: Version,
}

impl ArtifactKey {
    pub fn new(classifier: &str, id: &str, version: Version) -> Self {
        Self {
            classifier: classifier.to_string(),
            id: id.to_string(),
            version,
        }
    }

    /// File name used by directory-backed artifact stores
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}", self.classifier, self.id, self.version)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.classifier, self.id, self.version)
    }
}

/// Declares which units a unit updates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateDescriptor {
    pub id: String,
    pub range: VersionRange,
    #[serde(default)]
    pub severity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdateDescriptor {
    pub fn new(id: &str, range: VersionRange) -> Self {
        Self {
            id: id.to_string(),
            range,
            severity: 0,
            description: None,
        }
    }

    /// Whether `unit`'s id and version fall under this descriptor
    pub fn is_update_of(&self, unit: &InstallableUnit) -> bool {
        self.id == unit.id && self.range.contains(&unit.version)
    }
}

/// Patch-specific metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PatchDetails {
    pub changes: Vec<RequirementChange>,
    /// Outer list is OR, inner lists are AND; empty means "any unit"
    #[serde(default)]
    pub applicability_scope: Vec<Vec<Requirement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Requirement>,
}

/// An installable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallableUnit {
    pub id: String,
    pub version: Version,
    #[serde(default)]
    pub provided: Vec<ProvidedCapability>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Ordered list of phase-id -> instruction body maps
    #[serde(default)]
    pub touchpoint_data: Vec<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_descriptor: Option<UpdateDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchDetails>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactKey>,
    #[serde(default)]
    pub singleton: bool,
}

impl InstallableUnit {
    /// Start building a unit; the id capability is added automatically
    pub fn builder(id: &str, version: Version) -> UnitBuilder {
        UnitBuilder::new(id, version)
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(&self.id, self.version.clone())
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// A unit is a patch when it carries patch details or `patch=true`
    pub fn is_patch(&self) -> bool {
        self.patch.is_some() || self.property(PROP_PATCH) == Some("true")
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Whether some provided capability satisfies `requirement`
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        requirement.is_match(self)
    }

    /// Instructions recorded for a phase, concatenated in declaration order
    pub fn instructions_for(&self, phase_id: &str) -> Vec<&str> {
        self.touchpoint_data
            .iter()
            .filter_map(|data| data.get(phase_id).map(String::as_str))
            .collect()
    }
}

impl fmt::Display for InstallableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Builder for [`InstallableUnit`]
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    unit: InstallableUnit,
}

impl UnitBuilder {
    fn new(id: &str, version: Version) -> Self {
        let self_capability = ProvidedCapability::new(NAMESPACE_IU_ID, id, version.clone());
        Self {
            unit: InstallableUnit {
                id: id.to_string(),
                version,
                provided: vec![self_capability],
                requirements: Vec::new(),
                properties: BTreeMap::new(),
                touchpoint_data: Vec::new(),
                update_descriptor: None,
                patch: None,
                artifacts: Vec::new(),
                singleton: false,
            },
        }
    }

    pub fn provides(mut self, capability: ProvidedCapability) -> Self {
        self.unit.provided.push(capability);
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.unit.requirements.push(requirement);
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.unit.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn touchpoint(mut self, phase_id: &str, body: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert(phase_id.to_string(), body.to_string());
        self.unit.touchpoint_data.push(data);
        self
    }

    pub fn update_descriptor(mut self, descriptor: UpdateDescriptor) -> Self {
        self.unit.update_descriptor = Some(descriptor);
        self
    }

    pub fn patch(mut self, details: PatchDetails) -> Self {
        self.unit.patch = Some(details);
        self
    }

    pub fn artifact(mut self, key: ArtifactKey) -> Self {
        self.unit.artifacts.push(key);
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.unit.singleton = singleton;
        self
    }

    /// Finish the unit, validating requirement cardinalities
    pub fn build(self) -> Result<InstallableUnit> {
        for req in &self.unit.requirements {
            req.validate()?;
        }
        if let Some(ref patch) = self.unit.patch {
            for change in &patch.changes {
                if let Some(ref to) = change.to {
                    to.validate()?;
                }
            }
        }
        Ok(self.unit)
    }
}
