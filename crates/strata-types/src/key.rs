//! Content keys.
//!
//! A [`ContentKey`] is an ordered, non-empty sequence of path segments, e.g.
//! `["warehouse", "sales", "orders"]`. Keys order segment by segment, so
//! `a.b` sorts before `a.b.c`, which sorts before `a.c`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Separator used by [`ContentKey::parse`] and `Display`.
pub const SEPARATOR: char = '.';

/// Path identifying a logical object inside a commit's key space.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ContentKey(Vec<String>);

impl ContentKey {
    /// Build a key from its segments.
    ///
    /// Fails if there are no segments, or if any segment is empty or
    /// contains a NUL byte.
    pub fn new<I, S>(segments: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self::validate(&segments)?;
        Ok(Self(segments))
    }

    /// Parse a dotted key such as `"db.schema.table"`.
    ///
    /// ```
    /// use strata_types::ContentKey;
    ///
    /// let key = ContentKey::parse("db.orders").unwrap();
    /// assert_eq!(key.segments(), ["db", "orders"]);
    /// assert!(ContentKey::parse("db..orders").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::new(s.split(SEPARATOR))
    }

    /// The key's segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last segment of the key.
    pub fn name(&self) -> &str {
        // Non-empty by construction.
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Segment-wise prefix test: `a.b` is a prefix of `a.b.c` but not of `a.bc`.
    /// Every key is a prefix of itself.
    pub fn starts_with(&self, prefix: &ContentKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Append a segment, producing a child key.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, TypeError> {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self::new(segments)
    }

    fn validate(segments: &[String]) -> Result<(), TypeError> {
        let invalid = |reason: &str| TypeError::InvalidKey {
            key: segments.join("."),
            reason: reason.into(),
        };
        if segments.is_empty() {
            return Err(invalid("key must have at least one segment"));
        }
        for segment in segments {
            if segment.is_empty() {
                return Err(invalid("segments must not be empty"));
            }
            if segment.contains('\0') {
                return Err(invalid("segments must not contain NUL"));
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<String>> for ContentKey {
    type Error = TypeError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        Self::validate(&segments)?;
        Ok(Self(segments))
    }
}

impl From<ContentKey> for Vec<String> {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    #[test]
    fn rejects_empty_key() {
        assert!(ContentKey::new(Vec::<String>::new()).is_err());
        assert!(ContentKey::parse("").is_err());
    }

    #[test]
    fn rejects_empty_or_nul_segments() {
        assert!(ContentKey::parse("a..b").is_err());
        assert!(ContentKey::new(["a", "b\0c"]).is_err());
    }

    #[test]
    fn orders_segment_wise() {
        let mut keys = vec![key("a.c"), key("a.b.c"), key("a.b"), key("a")];
        keys.sort();
        assert_eq!(keys, vec![key("a"), key("a.b"), key("a.b.c"), key("a.c")]);
    }

    #[test]
    fn prefix_is_segment_wise() {
        assert!(key("a.b.c").starts_with(&key("a.b")));
        assert!(key("a.b").starts_with(&key("a.b")));
        assert!(!key("a.bc").starts_with(&key("a.b")));
        assert!(!key("a").starts_with(&key("a.b")));
    }

    #[test]
    fn display_joins_with_dots() {
        assert_eq!(key("x.y.z").to_string(), "x.y.z");
        assert_eq!(key("x.y.z").name(), "z");
        assert_eq!(key("x.y.z").depth(), 3);
    }

    #[test]
    fn child_appends_segment() {
        assert_eq!(key("a").child("b").unwrap(), key("a.b"));
        assert!(key("a").child("").is_err());
    }

    #[test]
    fn serde_rejects_invalid_segments() {
        let json = serde_json::to_string(&vec!["a", ""]).unwrap();
        assert!(serde_json::from_str::<ContentKey>(&json).is_err());
        let ok: ContentKey = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(ok, key("a.b"));
    }

    proptest! {
        #[test]
        fn parse_display_roundtrip(segments in prop::collection::vec("[a-z0-9_]{1,8}", 1..5)) {
            let k = ContentKey::new(segments.clone()).unwrap();
            prop_assert_eq!(ContentKey::parse(&k.to_string()).unwrap(), k);
        }
    }
}
