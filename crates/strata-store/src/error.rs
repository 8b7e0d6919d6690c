use std::fmt;
use std::time::Duration;

use strata_codec::CodecError;
use strata_model::ModelError;
use strata_types::{ContentId, ContentKey, Hash, TypeError};

/// What a [`StoreError::NotFound`] was looking for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Missing {
    Commit(Hash),
    Content { content_id: ContentId, version: Hash },
    Reference(String),
    GlobalState(ContentId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit(hash) => write!(f, "commit {hash}"),
            Self::Content {
                content_id,
                version,
            } => write!(f, "content {content_id}@{}", version.short_hex()),
            Self::Reference(name) => write!(f, "reference {name}"),
            Self::GlobalState(content_id) => write!(f, "global state for {content_id}"),
        }
    }
}

/// Errors surfaced by adapters and everything built on them.
///
/// Backend-specific errors never cross the adapter boundary; adapters map
/// them onto these variants.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested commit, content, reference or record is absent.
    #[error("not found: {0}")]
    NotFound(Missing),

    /// A reference with this name already exists.
    #[error("reference already exists: {0}")]
    AlreadyExists(String),

    /// A single-shot reference update lost a race: the reference no longer
    /// points where the caller expected.
    #[error("reference {reference} is at {}, expected {}", .actual.short_hex(), .expected.short_hex())]
    ConflictRejected {
        reference: String,
        expected: Hash,
        actual: Hash,
    },

    /// The commit protocol kept losing the reference race.
    #[error("gave up committing to {reference} after {attempts} attempts")]
    ConflictExhausted { reference: String, attempts: u32 },

    /// Concurrent changes touched the same keys as the proposal.
    #[error("merge conflict on keys: {}", join_keys(.keys))]
    MergeConflict { keys: Vec<ContentKey> },

    /// Stored bytes failed to decode.
    #[error("corrupt {what}: {reason}")]
    CorruptData { what: String, reason: String },

    /// The backend is unreachable or failed.
    #[error("backend connection error: {0}")]
    Connection(String),

    /// A backend call exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The request itself is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn join_keys(keys: &[ContentKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoreError {
    /// Whether an idempotent operation may be retried after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn commit_not_found(hash: Hash) -> Self {
        Self::NotFound(Missing::Commit(hash))
    }

    pub fn reference_not_found(name: impl Into<String>) -> Self {
        Self::NotFound(Missing::Reference(name.into()))
    }

    pub fn corrupt(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::CorruptData {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Colliding keys sorted and deduplicated.
    pub fn merge_conflict(mut keys: Vec<ContentKey>) -> Self {
        keys.sort();
        keys.dedup();
        Self::MergeConflict { keys }
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::CorruptData { what, reason } => Self::CorruptData {
                what: what.to_string(),
                reason,
            },
            CodecError::Serialization(reason) => Self::InvalidArgument(reason),
        }
    }
}

impl From<ModelError> for StoreError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Codec(codec) => codec.into(),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
