use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Identity of a logical object, stable across every version of it.
///
/// Distinct from the per-version [`Hash`](crate::Hash): editing the content
/// at a key keeps its `ContentId` and produces a new version. Newly created
/// objects get a UUID v7, so ids sort roughly by creation time.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap an existing id. Fails on empty strings.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() || id.contains('\0') {
            return Err(TypeError::InvalidContentId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentId {
    type Error = TypeError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

/// One-byte content-type discriminant.
///
/// The core never interprets content bodies; the type only selects a merge
/// policy and is carried alongside each key for callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentType(pub u8);

impl ContentType {
    pub const GENERIC: Self = Self(0);
    pub const TABLE: Self = Self(1);
    pub const VIEW: Self = Self(2);
    pub const NAMESPACE: Self = Self(3);

    /// Human-readable name for the built-in types.
    pub fn label(&self) -> &'static str {
        match self.0 {
            0 => "generic",
            1 => "table",
            2 => "view",
            3 => "namespace",
            _ => "custom",
        }
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::GENERIC
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label(), self.0)
    }
}
