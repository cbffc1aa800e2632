//! Dotted event-name patterns.
//!
//! Event names are dotted paths such as `message`, `$.online.here` or
//! `$.error.publish`. A pattern is matched segment by segment:
//!
//! | Pattern | Matches | Does not match |
//! |---------|---------|----------------|
//! | `a.b` | `a.b` | `a`, `a.b.c` |
//! | `a.*` | `a.b`, `a.b.c` | `a`, `ab` |
//! | `*` | everything | |
//!
//! Only the **last** segment may act as a wildcard; a `*` anywhere else is a
//! literal segment.

use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '.';
const WILDCARD: &str = "*";

/// A parsed event-name pattern.
///
/// Parsing never fails. Use [`is_valid`](Self::is_valid) to reject patterns
/// with empty segments where that matters (e.g. plugin configuration).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventPattern {
    raw: String,
    /// Segments before the trailing wildcard (or all segments when exact).
    prefix: Vec<String>,
    wildcard: bool,
}

impl EventPattern {
    /// Parses a pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let mut prefix: Vec<String> = raw.split(SEPARATOR).map(str::to_owned).collect();
        let wildcard = prefix.last().is_some_and(|last| last == WILDCARD);
        if wildcard {
            prefix.pop();
        }
        Self {
            raw,
            prefix,
            wildcard,
        }
    }

    /// The universal pattern `*`.
    pub fn any() -> Self {
        Self::new(WILDCARD)
    }

    /// Returns the pattern exactly as it was written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` for the universal pattern `*`.
    pub fn is_any(&self) -> bool {
        self.wildcard && self.prefix.is_empty()
    }

    /// Returns `true` when the last segment is `*`.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Returns `true` when no segment is empty.
    pub fn is_valid(&self) -> bool {
        !self.raw.is_empty() && self.raw.split(SEPARATOR).all(|segment| !segment.is_empty())
    }

    /// Checks whether `event` is matched by this pattern.
    pub fn matches(&self, event: &str) -> bool {
        if self.is_any() {
            return true;
        }
        if !self.wildcard {
            return self.raw == event;
        }

        let mut segments = event.split(SEPARATOR);
        for expected in &self.prefix {
            match segments.next() {
                Some(segment) if segment == expected => {}
                _ => return false,
            }
        }
        // `a.*` needs something after the prefix.
        segments.next().is_some()
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for EventPattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventPattern {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&String> for EventPattern {
    fn from(value: &String) -> Self {
        Self::new(value.as_str())
    }
}

impl FromStr for EventPattern {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        let pattern = EventPattern::new("message");
        assert!(pattern.matches("message"));
        assert!(!pattern.matches("message.edit"));
        assert!(!pattern.matches("messages"));
        assert!(!pattern.is_wildcard());
    }

    #[test]
    fn test_wildcard_requires_suffix() {
        let pattern = EventPattern::new("a.*");
        assert!(pattern.matches("a.b"));
        assert!(pattern.matches("a.b.c"));
        assert!(!pattern.matches("a"));
        assert!(!pattern.matches("ab"));
        assert!(!pattern.matches("b.a"));
    }

    #[test]
    fn test_nested_wildcard() {
        let pattern = EventPattern::new("$.error.*");
        assert!(pattern.matches("$.error.publish"));
        assert!(pattern.matches("$.error.search.history"));
        assert!(!pattern.matches("$.error"));
        assert!(!pattern.matches("$.online.here"));
    }

    #[test]
    fn test_universal_pattern() {
        let pattern = EventPattern::any();
        assert!(pattern.is_any());
        assert!(pattern.matches("a"));
        assert!(pattern.matches("$.online.here"));
    }

    #[test]
    fn test_inner_star_is_literal() {
        let pattern = EventPattern::new("a.*.c");
        assert!(pattern.matches("a.*.c"));
        assert!(!pattern.matches("a.b.c"));
    }

    #[test]
    fn test_validity() {
        assert!(EventPattern::new("a.b").is_valid());
        assert!(EventPattern::new("*").is_valid());
        assert!(!EventPattern::new("").is_valid());
        assert!(!EventPattern::new("a..b").is_valid());
        assert!(!EventPattern::new("a.").is_valid());
    }
}
