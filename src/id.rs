//! Element identifiers.
//! Fresh IDs are ULIDs from a monotonic generator, so lexical order matches
//! creation order. IDs read back from storage are kept verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Opaque, immutable identifier of an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    /// Wrap an existing identifier (e.g. one loaded from a saved dashboard)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Ulid> for ElementId {
    fn from(value: Ulid) -> Self {
        Self(value.to_string())
    }
}

/// Monotonic ID generator
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    /// Last ULID handed out
    last: Option<Ulid>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next ID
    pub fn next_id(&mut self) -> ElementId {
        let mut ulid = Ulid::new();
        if let Some(last) = self.last {
            // Same millisecond (or a clock step back): bump the random part.
            if ulid <= last {
                ulid = last.increment().unwrap_or(ulid);
            }
        }
        self.last = Some(ulid);
        ElementId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let mut gen = IdGenerator::new();
        let ids: Vec<ElementId> = (0..100).map(|_| gen.next_id()).collect();

        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} should sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_loaded_ids_are_kept_verbatim() {
        let id = ElementId::new("element-1712345678");
        assert_eq!(id.as_str(), "element-1712345678");
        assert_eq!(id.to_string(), "element-1712345678");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"element-1712345678\"");
    }
}
