// SPDX-License-Identifier: MIT

//! Namespaces and glob-style namespace patterns
//!
//! A namespace is a dot-delimited path such as `root.outer.inner`. Patterns
//! use `*` for exactly one segment and `**` for any number of segments
//! (including none). `AccessPattern` groups the read and write patterns a
//! node is allowed to use; matching is deny-by-default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PackError;

/// Dot-delimited hierarchical path. The empty namespace is the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Parse and validate a namespace path
    pub fn new(path: impl Into<String>) -> Result<Self, PackError> {
        let path = path.into();
        if path.is_empty() {
            return Ok(Self::root());
        }
        if path.split('.').any(|s| !is_valid_segment(s)) {
            return Err(PackError::InvalidNamespace(path));
        }
        Ok(Self(path))
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a local segment: `demo` + `greet` = `demo.greet`
    pub fn child(&self, segment: &str) -> Result<Self, PackError> {
        if !is_valid_segment(segment) {
            return Err(PackError::InvalidNamespace(format!("{}.{}", self.0, segment)));
        }
        if self.is_root() {
            Ok(Self(segment.to_string()))
        } else {
            Ok(Self(format!("{}.{}", self.0, segment)))
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        if self.is_root() {
            vec![]
        } else {
            self.0.split('.').collect()
        }
    }

    /// Last segment, if any
    pub fn local(&self) -> Option<&str> {
        self.0.rsplit('.').next().filter(|s| !s.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.contains('*')
        && !segment.contains('.')
        && !segment.chars().any(char::is_whitespace)
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = PackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Namespace {
    type Error = PackError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    One,
    /// `**`
    Any,
}

/// Parsed glob pattern over namespace segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespacePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl NamespacePattern {
    pub fn parse(raw: &str) -> Result<Self, PackError> {
        let segments = if raw.is_empty() {
            vec![]
        } else {
            raw.split('.')
                .map(|s| match s {
                    "*" => Ok(Segment::One),
                    "**" => Ok(Segment::Any),
                    lit if is_valid_segment(lit) => Ok(Segment::Literal(lit.to_string())),
                    _ => Err(PackError::InvalidPattern(raw.to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Pattern matching every namespace
    pub fn any() -> Self {
        Self {
            raw: "**".to_string(),
            segments: vec![Segment::Any],
        }
    }

    /// Pattern matching exactly one namespace
    pub fn exact(namespace: &Namespace) -> Self {
        Self {
            raw: namespace.as_str().to_string(),
            segments: namespace
                .segments()
                .into_iter()
                .map(|s| Segment::Literal(s.to_string()))
                .collect(),
        }
    }

    /// Pattern matching every namespace strictly below `namespace`
    pub fn descendants(namespace: &Namespace) -> Self {
        let mut pattern = Self::exact(namespace);
        pattern.segments.push(Segment::Any);
        pattern.raw = if namespace.is_root() {
            "**".to_string()
        } else {
            format!("{}.**", namespace)
        };
        pattern
    }

    pub fn matches(&self, namespace: &Namespace) -> bool {
        match_segments(&self.segments, &namespace.segments())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Any, rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((Segment::One, rest)) => !path.is_empty() && match_segments(rest, &path[1..]),
        Some((Segment::Literal(lit), rest)) => {
            path.first().is_some_and(|p| p == lit) && match_segments(rest, &path[1..])
        }
    }
}

impl fmt::Display for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for NamespacePattern {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NamespacePattern {
    type Error = PackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NamespacePattern> for String {
    fn from(p: NamespacePattern) -> Self {
        p.raw
    }
}

/// Kind of store access being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
        }
    }
}

/// Readable and writable namespace patterns declared by a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessPattern {
    #[serde(default)]
    pub read: Vec<NamespacePattern>,
    #[serde(default)]
    pub write: Vec<NamespacePattern>,
}

impl AccessPattern {
    /// Unrestricted read and write
    pub fn all() -> Self {
        Self {
            read: vec![NamespacePattern::any()],
            write: vec![NamespacePattern::any()],
        }
    }

    /// Read anywhere, write only inside `namespace` and below it
    pub fn scoped(namespace: &Namespace) -> Self {
        Self {
            read: vec![NamespacePattern::any()],
            write: vec![
                NamespacePattern::exact(namespace),
                NamespacePattern::descendants(namespace),
            ],
        }
    }

    /// Access set that denies everything
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from raw pattern strings
    pub fn from_patterns(read: &[&str], write: &[&str]) -> Result<Self, PackError> {
        let parse = |raw: &[&str]| {
            raw.iter()
                .map(|p| NamespacePattern::parse(p))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            read: parse(read)?,
            write: parse(write)?,
        })
    }

    pub fn can_read(&self, namespace: &Namespace) -> bool {
        self.read.iter().any(|p| p.matches(namespace))
    }

    pub fn can_write(&self, namespace: &Namespace) -> bool {
        self.write.iter().any(|p| p.matches(namespace))
    }

    /// Fail with `AccessDenied` unless some pattern for `operation` matches
    pub fn check(&self, operation: Operation, namespace: &Namespace) -> Result<(), PackError> {
        let allowed = match operation {
            Operation::Read => self.can_read(namespace),
            Operation::Write => self.can_write(namespace),
        };
        if allowed {
            Ok(())
        } else {
            Err(PackError::AccessDenied {
                operation,
                namespace: namespace.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(s: &str) -> Namespace {
        Namespace::new(s).unwrap()
    }

    fn pat(s: &str) -> NamespacePattern {
        NamespacePattern::parse(s).unwrap()
    }

    #[test]
    fn test_child_composition() {
        let root = Namespace::root();
        let demo = root.child("demo").unwrap();
        assert_eq!(demo.as_str(), "demo");

        let greet = demo.child("greet").unwrap();
        assert_eq!(greet.as_str(), "demo.greet");
        assert_eq!(greet.segments(), vec!["demo", "greet"]);
        assert_eq!(greet.local(), Some("greet"));
        assert_eq!(root.local(), None);
    }

    #[test]
    fn test_invalid_namespaces() {
        assert!(Namespace::new("a..b").is_err());
        assert!(Namespace::new("a.*").is_err());
        assert!(Namespace::new("a b").is_err());
        assert!(ns("a").child("").is_err());
        assert!(ns("a").child("b.c").is_err());
    }

    #[test]
    fn test_literal_pattern() {
        let p = pat("demo.greet");
        assert!(p.matches(&ns("demo.greet")));
        assert!(!p.matches(&ns("demo")));
        assert!(!p.matches(&ns("demo.greet.inner")));
    }

    #[test]
    fn test_single_wildcard() {
        let p = pat("demo.*");
        assert!(p.matches(&ns("demo.greet")));
        assert!(p.matches(&ns("demo.other")));
        assert!(!p.matches(&ns("demo")));
        assert!(!p.matches(&ns("demo.greet.inner")));
    }

    #[test]
    fn test_double_wildcard() {
        let p = pat("root.**");
        assert!(p.matches(&ns("root")));
        assert!(p.matches(&ns("root.outer")));
        assert!(p.matches(&ns("root.outer.inner")));
        assert!(!p.matches(&ns("other.outer")));

        let any = pat("**");
        assert!(any.matches(&Namespace::root()));
        assert!(any.matches(&ns("a.b.c")));
    }

    #[test]
    fn test_double_wildcard_in_middle() {
        let p = pat("root.**.inner");
        assert!(p.matches(&ns("root.inner")));
        assert!(p.matches(&ns("root.outer.inner")));
        assert!(p.matches(&ns("root.a.b.inner")));
        assert!(!p.matches(&ns("root.outer")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(NamespacePattern::parse("a.***").is_err());
        assert!(NamespacePattern::parse("a..b").is_err());
        assert!(NamespacePattern::parse("a.b*").is_err());
    }

    #[test]
    fn test_access_deny_by_default() {
        let access = AccessPattern::none();
        let err = access.check(Operation::Read, &ns("demo")).unwrap_err();
        assert!(matches!(
            err,
            PackError::AccessDenied {
                operation: Operation::Read,
                ..
            }
        ));
    }

    #[test]
    fn test_scoped_access() {
        let access = AccessPattern::scoped(&ns("demo.greet"));
        assert!(access.can_read(&ns("anything.at.all")));
        assert!(access.can_write(&ns("demo.greet")));
        assert!(access.can_write(&ns("demo.greet.inner")));
        assert!(!access.can_write(&ns("demo")));
        assert!(!access.can_write(&ns("demo.other")));
    }

    #[test]
    fn test_pattern_serde() {
        let access: AccessPattern =
            serde_yaml::from_str("read: ['demo.*']\nwrite: ['demo.greet']").unwrap();
        assert!(access.can_read(&ns("demo.x")));
        assert!(access.can_write(&ns("demo.greet")));

        let bad: Result<AccessPattern, _> = serde_yaml::from_str("read: ['a.b*']");
        assert!(bad.is_err());
    }
}
