// src/metadata/filter.rs

//! LDAP-style filter expressions
//!
//! Filters are evaluated against a flat string map: either the attribute set
//! of a provided capability (match filters) or the environment properties of
//! a provisioning context (applicability filters).
//!
//! Grammar: `(&(a=1)(|(b>=2.0)(!(c=*))))`. Supported comparisons are `=`,
//! `~=`, `>=`, `<=`, presence (`attr=*`), and substrings (`attr=pre*mid*`).
//! `>=`/`<=` compare as versions when both sides parse as versions, and
//! lexicographically otherwise.

use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Filter parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("empty filter")]
    Empty,

    #[error("expected '{expected}' at offset {offset}")]
    Expected { expected: char, offset: usize },

    #[error("missing attribute name at offset {0}")]
    MissingAttribute(usize),

    #[error("missing comparison operator at offset {0}")]
    MissingOperator(usize),

    #[error("trailing characters at offset {0}")]
    Trailing(usize),
}

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { attr: String, value: String },
    Approx { attr: String, value: String },
    GreaterEq { attr: String, value: String },
    LessEq { attr: String, value: String },
    Present { attr: String },
    /// `attr=a*b*c`, stored as the literal pieces between wildcards
    Substring { attr: String, pieces: Vec<String> },
}

impl Filter {
    /// Parse a filter string
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let chars: Vec<char> = input.trim().chars().collect();
        if chars.is_empty() {
            return Err(FilterError::Empty);
        }
        let mut parser = Parser { chars, pos: 0 };
        let filter = parser.filter()?;
        if parser.pos != parser.chars.len() {
            return Err(FilterError::Trailing(parser.pos));
        }
        Ok(filter)
    }

    /// Evaluate against a set of attributes
    pub fn matches(&self, attrs: &BTreeMap<String, String>) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(attrs)),
            Filter::Or(items) => items.iter().any(|f| f.matches(attrs)),
            Filter::Not(inner) => !inner.matches(attrs),
            Filter::Present { attr } => lookup(attrs, attr).is_some(),
            Filter::Equal { attr, value } => lookup(attrs, attr).is_some_and(|v| v == value),
            Filter::Approx { attr, value } => {
                lookup(attrs, attr).is_some_and(|v| normalize(v) == normalize(value))
            }
            Filter::GreaterEq { attr, value } => {
                lookup(attrs, attr).is_some_and(|v| compare_values(v, value) != Ordering::Less)
            }
            Filter::LessEq { attr, value } => lookup(attrs, attr)
                .is_some_and(|v| compare_values(v, value) != Ordering::Greater),
            Filter::Substring { attr, pieces } => {
                lookup(attrs, attr).is_some_and(|v| substring_match(v, pieces))
            }
        }
    }
}

/// Attribute keys are matched exactly first, then case-insensitively
fn lookup<'a>(attrs: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    attrs
        .get(key)
        .or_else(|| {
            attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compare_values(actual: &str, expected: &str) -> Ordering {
    match (Version::parse(actual), Version::parse(expected)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual.cmp(expected),
    }
}

fn substring_match(value: &str, pieces: &[String]) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return true;
    };
    let Some(mut remaining) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for piece in middle {
        match remaining.find(piece.as_str()) {
            Some(idx) => remaining = &remaining[idx + piece.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(FilterError::Expected {
                expected,
                offset: self.pos,
            })
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.expect('(')?;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some('(') {
                break;
            }
            items.push(self.filter()?);
        }
        if items.is_empty() {
            return Err(FilterError::Expected {
                expected: '(',
                offset: self.pos,
            });
        }
        Ok(items)
    }

    fn item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attr: String = self.chars[start..self.pos].iter().collect();
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(FilterError::MissingAttribute(start));
        }

        let op = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (Some('='), _) => {
                self.pos += 1;
                '='
            }
            (Some(c @ ('~' | '>' | '<')), Some('=')) => {
                self.pos += 2;
                c
            }
            _ => return Err(FilterError::MissingOperator(self.pos)),
        };

        let pieces = self.value_pieces();
        if op != '=' {
            let value = pieces.join("*");
            return Ok(match op {
                '~' => Filter::Approx { attr, value },
                '>' => Filter::GreaterEq { attr, value },
                _ => Filter::LessEq { attr, value },
            });
        }

        Ok(match pieces.len() {
            1 => Filter::Equal {
                attr,
                value: pieces.into_iter().next().unwrap_or_default(),
            },
            2 if pieces.iter().all(String::is_empty) => Filter::Present { attr },
            _ => Filter::Substring { attr, pieces },
        })
    }

    /// Read a value up to the closing paren, splitting on unescaped `*`
    fn value_pieces(&mut self) -> Vec<String> {
        let mut pieces = vec![String::new()];
        while let Some(c) = self.peek() {
            match c {
                ')' => break,
                '\\' => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        if let Some(last) = pieces.last_mut() {
                            last.push(escaped);
                        }
                        self.pos += 1;
                    }
                }
                '*' => {
                    pieces.push(String::new());
                    self.pos += 1;
                }
                _ => {
                    if let Some(last) = pieces.last_mut() {
                        last.push(c);
                    }
                    self.pos += 1;
                }
            }
        }
        pieces
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) | Filter::Or(items) => {
                let op = if matches!(self, Filter::And(_)) { '&' } else { '|' };
                write!(f, "({}", op)?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Equal { attr, value } => write!(f, "({}={})", attr, escape(value)),
            Filter::Approx { attr, value } => write!(f, "({}~={})", attr, escape(value)),
            Filter::GreaterEq { attr, value } => write!(f, "({}>={})", attr, escape(value)),
            Filter::LessEq { attr, value } => write!(f, "({}<={})", attr, escape(value)),
            Filter::Present { attr } => write!(f, "({}=*)", attr),
            Filter::Substring { attr, pieces } => {
                let joined: Vec<String> = pieces.iter().map(|p| escape(p)).collect();
                write!(f, "({}={})", attr, joined.join("*"))
            }
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Filter {
    type Error = FilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Filter> for String {
    fn from(value: Filter) -> Self {
        value.to_string()
    }
}

impl From<FilterError> for crate::error::Error {
    fn from(err: FilterError) -> Self {
        crate::error::Error::InvalidFilter(err.to_string())
    }
}
