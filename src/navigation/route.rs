//! Route keys and the patterns they are matched against

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

static PARAM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("param name regex"));

/// Normalized route string: no leading, trailing or repeated `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RouteKey(String);

impl RouteKey {
    pub fn new(raw: &str) -> Self {
        let normalized = raw
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RouteKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for RouteKey {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&RouteKey> for RouteKey {
    fn from(key: &RouteKey) -> Self {
        key.clone()
    }
}

impl From<RouteKey> for String {
    fn from(key: RouteKey) -> Self {
        key.0
    }
}

impl Borrow<str> for RouteKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `:name`, captures exactly one segment
    Param(String),
    /// `*name`, captures the remaining segments (at least one)
    Wildcard(String),
}

/// A parsed route pattern such as `feed/:feedId` or `docs/*path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidRoutePattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let key = RouteKey::new(pattern);
        if key.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let parts: Vec<&str> = key.segments().collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (index, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if index + 1 != parts.len() {
                    return Err(invalid("wildcard must be the last segment"));
                }
                Segment::Wildcard(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };

            if let Segment::Param(name) | Segment::Wildcard(name) = &segment {
                if !PARAM_NAME.is_match(name) {
                    return Err(invalid(&format!("'{}' is not a valid parameter name", name)));
                }
                if names.contains(&name.as_str()) {
                    return Err(invalid(&format!("parameter '{}' appears twice", name)));
                }
                names.push(&part[1..]);
            }

            segments.push(segment);
        }

        Ok(Self {
            raw: key.0,
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a key, returning the captured parameters on success
    pub fn matches(&self, key: &RouteKey) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = key.segments().collect();
        let mut captures = Vec::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    if parts.get(index) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(index)?;
                    captures.push((name.clone(), (*value).to_string()));
                }
                Segment::Wildcard(name) => {
                    if parts.len() <= index {
                        return None;
                    }
                    captures.push((name.clone(), parts[index..].join("/")));
                    return Some(captures);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(captures)
    }

    /// Ordering key; higher sorts first during resolution
    pub fn specificity(&self) -> (usize, bool, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        let params = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count();
        let open_ended = self
            .segments
            .iter()
            .any(|s| matches!(s, Segment::Wildcard(_)));

        (literals, !open_ended, params)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) | Segment::Wildcard(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
