//! Error types for the object model.

use strata_codec::CodecError;
use strata_types::ContentKey;
use thiserror::Error;

/// Errors raised while building or encoding model values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A commit delta names the same key twice.
    #[error("duplicate key in commit: {0}")]
    DuplicateKey(ContentKey),

    /// A commit lists the same parent twice, or lists the no-ancestor hash.
    #[error("invalid parents: {0}")]
    InvalidParents(String),

    /// The reference name is invalid.
    #[error("invalid reference name {name:?}: {reason}")]
    InvalidReferenceName { name: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Convenience type alias for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
