use std::fmt;

use serde::{Deserialize, Serialize};
use strata_codec::{Canonical, ObjectKind};
use strata_types::Hash;

use crate::error::ModelResult;
use crate::names::validate_reference_name;

/// Whether a reference is a movable branch or a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Branch,
    Tag,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch => f.write_str("branch"),
            Self::Tag => f.write_str("tag"),
        }
    }
}

/// Version marker of a reference, bumped on every successful update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenerationToken(pub u64);

impl GenerationToken {
    /// Token of a freshly created reference.
    pub const INITIAL: Self = Self(1);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen:{}", self.0)
    }
}

/// Current value of a named reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub name: String,
    pub kind: ReferenceKind,
    pub hash: Hash,
    pub generation: GenerationToken,
}

impl ReferenceRecord {
    /// A new reference at its initial generation. Validates the name.
    pub fn new(name: impl Into<String>, kind: ReferenceKind, hash: Hash) -> ModelResult<Self> {
        let name = name.into();
        validate_reference_name(&name)?;
        Ok(Self {
            name,
            kind,
            hash,
            generation: GenerationToken::INITIAL,
        })
    }

    /// The record after a successful update to `hash`.
    pub fn advanced(&self, hash: Hash) -> Self {
        Self {
            hash,
            generation: self.generation.next(),
            ..self.clone()
        }
    }

    pub fn is_branch(&self) -> bool {
        self.kind == ReferenceKind::Branch
    }
}

impl Canonical for ReferenceRecord {
    const KIND: ObjectKind = ObjectKind::Reference;

    fn validate(&self) -> Result<(), String> {
        if self.generation.0 == 0 {
            return Err("generation must be at least 1".into());
        }
        validate_reference_name(&self.name).map_err(|e| e.to_string())
    }
}
