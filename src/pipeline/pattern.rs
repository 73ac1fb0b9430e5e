use regex::Regex;

use crate::error::{MigratorError, Result};

pub const WILDCARD: char = '*';

/// Anchored matcher compiled from a `*` wildcard pattern.
///
/// Every wildcard becomes a non-greedy capture; callers only ever see the
/// first one.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let body = pattern
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("(.*?)");
        let regex = Regex::new(&format!("^{body}$")).map_err(|e| {
            MigratorError::InvalidInput(format!("Failed to compile path pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Value bound to the first wildcard, or `None` when the candidate does not match.
    /// A pattern without wildcards yields an empty capture on an exact match.
    pub fn capture<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        let caps = self.regex.captures(candidate)?;
        Some(caps.get(1).map_or("", |m| m.as_str()))
    }
}
