use std::fmt;
use std::str::FromStr;

use crate::error::RouteError;

/// Marker that turns a pattern into a prefix match when it ends the pattern
pub const WILDCARD: char = '*';

/// A route path pattern.
///
/// `/about` matches only `/about`. `/assets/*` matches every path starting
/// with `/assets/`, including `/assets/` itself. Comparison is
/// case-sensitive and a trailing slash is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if !pattern.starts_with('/') {
            return Err(invalid("pattern must start with '/'"));
        }
        if pattern
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '?' || c == '#')
        {
            return Err(invalid("pattern contains whitespace, control characters, '?' or '#'"));
        }

        match pattern.find(WILDCARD) {
            None => Ok(PathPattern::Exact(pattern.to_string())),
            Some(index) if index == pattern.len() - 1 => {
                Ok(PathPattern::Prefix(pattern[..index].to_string()))
            }
            Some(_) => Err(invalid("'*' is only allowed at the end of a pattern")),
        }
    }

    /// The literal part of the pattern; for prefixes, without the wildcard
    pub fn literal(&self) -> &str {
        match self {
            PathPattern::Exact(path) | PathPattern::Prefix(path) => path,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, PathPattern::Prefix(_))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => path == exact,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }

    /// Ordering key among patterns matching the same path: longer literal
    /// first, and an exact pattern over a prefix of the same length.
    pub(crate) fn specificity(&self) -> (usize, bool) {
        (self.literal().len(), !self.is_prefix())
    }
}

impl FromStr for PathPattern {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathPattern::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(path) => f.write_str(path),
            PathPattern::Prefix(prefix) => write!(f, "{}{}", prefix, WILDCARD),
        }
    }
}
