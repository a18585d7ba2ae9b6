// src/version/mod.rs

//! Version values and version ranges for installable units
//!
//! Versions have the shape `major.minor.micro.qualifier`. Missing numeric
//! segments default to zero and an absent qualifier sorts before any
//! non-empty one, so `1.0` == `1.0.0` < `1.0.0.beta`.

mod range;

pub use range::VersionRange;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Textual form of [`Version::MAX`]
const MAX_LITERAL: &str = "max";

/// A parsed unit version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u64,
    minor: u64,
    micro: u64,
    qualifier: String,
    /// Upper sentinel used as the ceiling of open-ended ranges
    unbounded: bool,
}

impl Version {
    /// The lowest version, `0.0.0`
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: String::new(),
        unbounded: false,
    };

    /// A version greater than every parseable version
    pub const MAX: Version = Version {
        major: u64::MAX,
        minor: u64::MAX,
        micro: u64::MAX,
        qualifier: String::new(),
        unbounded: true,
    };

    /// Build a version from numeric segments with no qualifier
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
            unbounded: false,
        }
    }

    /// Attach a qualifier segment
    pub fn with_qualifier(mut self, qualifier: &str) -> Self {
        self.qualifier = qualifier.to_string();
        self
    }

    /// Parse a version string
    ///
    /// Accepted forms: `1`, `1.2`, `1.2.3`, `1.2.3.qualifier`, and the
    /// literal `max`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("empty version string".to_string()));
        }
        if s.eq_ignore_ascii_case(MAX_LITERAL) {
            return Ok(Self::MAX);
        }

        let mut parts = s.splitn(4, '.');
        let mut numbers = [0u64; 3];
        for (idx, slot) in numbers.iter_mut().enumerate() {
            match parts.next() {
                Some(part) => {
                    *slot = part.parse::<u64>().map_err(|_| {
                        Error::ParseError(format!(
                            "invalid segment {} '{}' in version '{}'",
                            idx + 1,
                            part,
                            s
                        ))
                    })?;
                }
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default();
        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::ParseError(format!(
                "invalid qualifier '{}' in version '{}'",
                qualifier, s
            )));
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            qualifier: qualifier.to_string(),
            unbounded: false,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn micro(&self) -> u64 {
        self.micro
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Whether this is the [`Version::MAX`] sentinel
    pub fn is_max(&self) -> bool {
        self.unbounded
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.unbounded, other.unbounded) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => (self.major, self.minor, self.micro, &self.qualifier).cmp(&(
                other.major,
                other.minor,
                other.micro,
                &other.qualifier,
            )),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unbounded {
            return write!(f, "{}", MAX_LITERAL);
        }
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_forms() {
        assert_eq!(Version::parse("1").unwrap(), Version::new(1, 0, 0));
        assert_eq!(Version::parse("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_qualifier() {
        let v = Version::parse("3.4.5.v2024-rc_1").unwrap();
        assert_eq!(v.micro(), 5);
        assert_eq!(v.qualifier(), "v2024-rc_1");
        assert_eq!(v.to_string(), "3.4.5.v2024-rc_1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("a.b").is_err());
        assert!(Version::parse("1.2.3.bad qualifier").is_err());
        assert!(Version::parse("1.-2").is_err());
    }

    #[test]
    fn test_ordering_numeric_not_lexicographic() {
        let v9 = Version::parse("1.9.0").unwrap();
        let v10 = Version::parse("1.10.0").unwrap();
        assert!(v9 < v10);
    }

    #[test]
    fn test_empty_qualifier_sorts_lowest() {
        let plain = Version::parse("1.0.0").unwrap();
        let qualified = Version::parse("1.0.0.a").unwrap();
        assert!(plain < qualified);
        assert!(Version::parse("1.0.0.a").unwrap() < Version::parse("1.0.0.b").unwrap());
    }

    #[test]
    fn test_max_is_greatest() {
        let huge = Version::parse("18446744073709551615.18446744073709551615.18446744073709551615.zzz")
            .unwrap();
        assert!(huge < Version::MAX);
        assert!(Version::ZERO < Version::MAX);
        assert_eq!(Version::parse("MAX").unwrap(), Version::MAX);
        assert_eq!(Version::MAX.to_string(), "max");
    }

    #[test]
    fn test_serde_as_string() {
        let v = Version::parse("2.1.0.final").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"2.1.0.final\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
