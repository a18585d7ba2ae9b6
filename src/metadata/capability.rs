// src/metadata/capability.rs

//! Provided capabilities and requirements
//!
//! A unit provides capabilities `(namespace, name, version, attributes)` and
//! declares requirements `(namespace, name, range, ...)`. Matching is
//! namespace + name equality, range membership, and an optional match filter
//! evaluated over the capability's attribute set.

use super::filter::Filter;
use super::unit::InstallableUnit;
use crate::error::{Error, Result};
use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace of the capability every unit provides for its own id
pub const NAMESPACE_IU_ID: &str = "installable.unit";

/// Attribute key carrying a capability's version
pub const ATTR_VERSION: &str = "version";

/// A capability offered by a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvidedCapability {
    pub namespace: String,
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ProvidedCapability {
    pub fn new(namespace: &str, name: &str, version: Version) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version,
            extra: BTreeMap::new(),
        }
    }

    /// Add an extra attribute visible to match filters
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }

    /// Full attribute set: extras plus `namespace -> name` and `version`
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = self.extra.clone();
        attrs.insert(self.namespace.clone(), self.name.clone());
        attrs.insert(ATTR_VERSION.to_string(), self.version.to_string());
        attrs
    }
}

impl fmt::Display for ProvidedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.version)
    }
}

fn default_one() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// A dependency on capabilities provided by other units
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub range: VersionRange,
    /// Environment applicability; when false the requirement is ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    /// Evaluated against the attributes of each candidate capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_filter: Option<Filter>,
    #[serde(default = "default_one")]
    pub min: u32,
    #[serde(default = "default_one")]
    pub max: u32,
    #[serde(default = "default_true")]
    pub greedy: bool,
}

impl Requirement {
    /// Marker for an unbounded `max`
    pub const UNBOUNDED: u32 = u32::MAX;

    /// A mandatory, single-cardinality, greedy requirement
    pub fn new(namespace: &str, name: &str, range: VersionRange) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            range,
            filter: None,
            match_filter: None,
            min: 1,
            max: 1,
            greedy: true,
        }
    }

    /// Requirement on a unit id
    pub fn unit(id: &str, range: VersionRange) -> Self {
        Self::new(NAMESPACE_IU_ID, id, range)
    }

    /// Set `min`/`max`, rejecting `min > max`
    pub fn with_cardinality(mut self, min: u32, max: u32) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidRequirement(format!(
                "{}: min {} exceeds max {}",
                self, min, max
            )));
        }
        self.min = min;
        self.max = max;
        Ok(self)
    }

    /// Make the requirement optional (`min = 0`)
    pub fn optional(mut self) -> Self {
        self.min = 0;
        self
    }

    pub fn with_greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_match_filter(mut self, filter: Filter) -> Self {
        self.match_filter = Some(filter);
        self
    }

    /// Check the `min <= max` invariant, for values built by deserialization
    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(Error::InvalidRequirement(format!(
                "{}: min {} exceeds max {}",
                self, self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn is_optional(&self) -> bool {
        self.min == 0
    }

    pub fn is_bounded(&self) -> bool {
        self.max != Self::UNBOUNDED
    }

    /// Whether the requirement applies in the given environment
    pub fn is_applicable(&self, environment: &BTreeMap<String, String>) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.matches(environment))
    }

    /// Whether a single capability satisfies this requirement
    pub fn is_satisfied_by(&self, capability: &ProvidedCapability) -> bool {
        if capability.namespace != self.namespace || capability.name != self.name {
            return false;
        }
        if !self.range.contains(&capability.version) {
            return false;
        }
        match &self.match_filter {
            Some(filter) => filter.matches(&capability.attributes()),
            None => true,
        }
    }

    /// Whether any capability of `unit` satisfies this requirement
    pub fn is_match(&self, unit: &InstallableUnit) -> bool {
        unit.provided.iter().any(|cap| self.is_satisfied_by(cap))
    }

    /// Namespace and name equality, ignoring range and cardinality
    pub fn same_target(&self, other: &Requirement) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.range)?;
        if let Some(ref filter) = self.match_filter {
            write!(f, " {}", filter)?;
        }
        Ok(())
    }
}

/// A rewrite a patch applies to a requirement of the units it targets
///
/// `from: None` adds `to`; `to: None` removes the matched requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequirementChange {
    pub from: Option<Requirement>,
    pub to: Option<Requirement>,
}

impl RequirementChange {
    pub fn new(from: Option<Requirement>, to: Option<Requirement>) -> Self {
        Self { from, to }
    }

    /// Whether this change rewrites `requirement`
    pub fn applies_to(&self, requirement: &Requirement) -> bool {
        self.from
            .as_ref()
            .is_some_and(|from| from.same_target(requirement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn r(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn test_attributes_include_name_and_version() {
        let cap = ProvidedCapability::new("java.package", "org.example", v("1.2.0"))
            .with_attribute("vendor", "acme");
        let attrs = cap.attributes();
        assert_eq!(attrs.get("java.package").map(String::as_str), Some("org.example"));
        assert_eq!(attrs.get("version").map(String::as_str), Some("1.2.0"));
        assert_eq!(attrs.get("vendor").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_satisfied_by_checks_namespace_name_range() {
        let req = Requirement::new("java.package", "org.example", r("[1.0.0,2.0.0)"));
        assert!(req.is_satisfied_by(&ProvidedCapability::new(
            "java.package",
            "org.example",
            v("1.5.0")
        )));
        assert!(!req.is_satisfied_by(&ProvidedCapability::new(
            "java.package",
            "org.example",
            v("2.0.0")
        )));
        assert!(!req.is_satisfied_by(&ProvidedCapability::new(
            "osgi.bundle",
            "org.example",
            v("1.5.0")
        )));
        assert!(!req.is_satisfied_by(&ProvidedCapability::new(
            "java.package",
            "org.other",
            v("1.5.0")
        )));
    }

    #[test]
    fn test_match_filter_uses_capability_attributes() {
        let req = Requirement::new("service", "db", VersionRange::any())
            .with_match_filter(Filter::parse("(vendor=acme)").unwrap());
        let acme = ProvidedCapability::new("service", "db", v("1.0")).with_attribute("vendor", "acme");
        let other = ProvidedCapability::new("service", "db", v("1.0")).with_attribute("vendor", "zed");
        assert!(req.is_satisfied_by(&acme));
        assert!(!req.is_satisfied_by(&other));
    }

    #[test]
    fn test_cardinality_invariant() {
        let req = Requirement::unit("a", VersionRange::any());
        assert!(req.clone().with_cardinality(2, 1).is_err());
        let multi = req.with_cardinality(0, Requirement::UNBOUNDED).unwrap();
        assert!(multi.is_optional());
        assert!(!multi.is_bounded());
    }

    #[test]
    fn test_applicability_filter() {
        let req = Requirement::unit("gtk-ui", VersionRange::any())
            .with_filter(Filter::parse("(os=linux)").unwrap());
        let mut env = BTreeMap::new();
        env.insert("os".to_string(), "linux".to_string());
        assert!(req.is_applicable(&env));
        env.insert("os".to_string(), "win32".to_string());
        assert!(!req.is_applicable(&env));
        assert!(Requirement::unit("x", VersionRange::any()).is_applicable(&BTreeMap::new()));
    }

    #[test]
    fn test_requirement_deserializes_with_defaults() {
        let req: Requirement =
            serde_json::from_str(r#"{"namespace":"installable.unit","name":"a"}"#).unwrap();
        assert_eq!(req.min, 1);
        assert_eq!(req.max, 1);
        assert!(req.greedy);
        assert!(req.range.is_any());
    }

    #[test]
    fn test_change_targets_structurally() {
        let change = RequirementChange::new(
            Some(Requirement::unit("b", VersionRange::any())),
            Some(Requirement::unit("d", r("[1.0.0,1.3.0)"))),
        );
        assert!(change.applies_to(&Requirement::unit("b", r("[1.0.0,1.1.0)"))));
        assert!(!change.applies_to(&Requirement::unit("c", r("[1.0.0,1.1.0)"))));
    }
}
