// src/version/range.rs

//! Version ranges with inclusive/exclusive bounds
//!
//! Syntax:
//! - `[1.0.0,2.0.0)` floor inclusive, ceiling exclusive (any bracket mix)
//! - `1.0.0` a bare version, meaning `[1.0.0,max]`
//! - `0.0.0` or the empty string, the range that accepts every version

use super::Version;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An interval of versions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    floor: Version,
    floor_inclusive: bool,
    ceiling: Version,
    ceiling_inclusive: bool,
}

impl VersionRange {
    /// Build a range, rejecting inverted or empty intervals
    pub fn new(
        floor: Version,
        floor_inclusive: bool,
        ceiling: Version,
        ceiling_inclusive: bool,
    ) -> Result<Self> {
        if floor > ceiling {
            return Err(Error::InvalidRange(format!(
                "floor {} is above ceiling {}",
                floor, ceiling
            )));
        }
        if floor == ceiling && !(floor_inclusive && ceiling_inclusive) {
            return Err(Error::InvalidRange(format!(
                "range on single version {} must be inclusive at both ends",
                floor
            )));
        }
        Ok(Self {
            floor,
            floor_inclusive,
            ceiling,
            ceiling_inclusive,
        })
    }

    /// The range matching every version
    pub fn any() -> Self {
        Self {
            floor: Version::ZERO,
            floor_inclusive: true,
            ceiling: Version::MAX,
            ceiling_inclusive: true,
        }
    }

    /// The range matching exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            floor: version.clone(),
            floor_inclusive: true,
            ceiling: version,
            ceiling_inclusive: true,
        }
    }

    /// `[version, max]`
    pub fn at_least(version: Version) -> Self {
        Self {
            floor: version,
            floor_inclusive: true,
            ceiling: Version::MAX,
            ceiling_inclusive: true,
        }
    }

    /// Parse the textual range syntax
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::any());
        }

        let first = s.chars().next().unwrap_or(' ');
        if first != '[' && first != '(' {
            return Ok(Self::at_least(Version::parse(s)?));
        }

        let last = s.chars().last().unwrap_or(' ');
        let ceiling_inclusive = match last {
            ']' => true,
            ')' => false,
            _ => {
                return Err(Error::InvalidRange(format!(
                    "range '{}' must end with ']' or ')'",
                    s
                )));
            }
        };

        let body = &s[1..s.len() - 1];
        let (floor, ceiling) = body.split_once(',').ok_or_else(|| {
            Error::InvalidRange(format!("range '{}' is missing a ',' separator", s))
        })?;

        Self::new(
            Version::parse(floor)?,
            first == '[',
            Version::parse(ceiling)?,
            ceiling_inclusive,
        )
    }

    pub fn floor(&self) -> &Version {
        &self.floor
    }

    pub fn ceiling(&self) -> &Version {
        &self.ceiling
    }

    pub fn floor_inclusive(&self) -> bool {
        self.floor_inclusive
    }

    pub fn ceiling_inclusive(&self) -> bool {
        self.ceiling_inclusive
    }

    /// Whether this is the range matching every version
    pub fn is_any(&self) -> bool {
        self.floor == Version::ZERO
            && self.floor_inclusive
            && self.ceiling.is_max()
            && self.ceiling_inclusive
    }

    /// Whether this range matches exactly one version
    pub fn is_strict(&self) -> bool {
        self.floor == self.ceiling && self.floor_inclusive && self.ceiling_inclusive
    }

    /// Test a version for membership
    pub fn contains(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            version >= &self.floor
        } else {
            version > &self.floor
        };
        if !above_floor {
            return false;
        }
        if self.ceiling_inclusive {
            version <= &self.ceiling
        } else {
            version < &self.ceiling
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "0.0.0");
        }
        if self.floor_inclusive && self.ceiling.is_max() && self.ceiling_inclusive {
            return write!(f, "{}", self.floor);
        }
        write!(
            f,
            "{}{},{}{}",
            if self.floor_inclusive { '[' } else { '(' },
            self.floor,
            self.ceiling,
            if self.ceiling_inclusive { ']' } else { ')' }
        )
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_any_matches_everything() {
        let range = VersionRange::parse("0.0.0").unwrap();
        assert!(range.is_any());
        assert!(range.contains(&Version::ZERO));
        assert!(range.contains(&v("999.0.0.z")));
        assert!(VersionRange::parse("").unwrap().is_any());
    }

    #[test]
    fn test_bare_version_is_open_ended() {
        let range = VersionRange::parse("1.2").unwrap();
        assert!(!range.contains(&v("1.1.9")));
        assert!(range.contains(&v("1.2.0")));
        assert!(range.contains(&v("40.0.0")));
        assert!(range.ceiling().is_max());
    }

    #[test]
    fn test_bound_combinations() {
        let cases = [
            ("[1.0.0,2.0.0]", true, true),
            ("[1.0.0,2.0.0)", true, false),
            ("(1.0.0,2.0.0]", false, true),
            ("(1.0.0,2.0.0)", false, false),
        ];
        for (text, floor_in, ceiling_in) in cases {
            let range = VersionRange::parse(text).unwrap();
            assert_eq!(range.contains(&v("1.0.0")), floor_in, "{}", text);
            assert_eq!(range.contains(&v("2.0.0")), ceiling_in, "{}", text);
            assert!(range.contains(&v("1.5.0")), "{}", text);
            assert!(!range.contains(&v("0.9.9")), "{}", text);
            assert!(!range.contains(&v("2.0.0.a")), "{}", text);
        }
    }

    #[test]
    fn test_strict_range() {
        let range = VersionRange::parse("[1.0.0,1.0.0]").unwrap();
        assert!(range.is_strict());
        assert!(range.contains(&v("1.0.0")));
        assert!(!range.contains(&v("1.0.0.a")));
        assert_eq!(range, VersionRange::exact(v("1.0.0")));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(VersionRange::parse("[2.0.0,1.0.0]").is_err());
        assert!(VersionRange::parse("[1.0.0,1.0.0)").is_err());
        assert!(VersionRange::parse("[1.0.0 2.0.0]").is_err());
        assert!(VersionRange::parse("[1.0.0,2.0.0").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["[1.0.0,2.0.0)", "(1.0.0,max]", "1.2.0", "0.0.0", "[3.0.0,3.0.0]"] {
            let range = VersionRange::parse(text).unwrap();
            assert_eq!(VersionRange::parse(&range.to_string()).unwrap(), range);
        }
    }
}
