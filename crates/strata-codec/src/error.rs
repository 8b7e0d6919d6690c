/// Errors from encoding and decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes are truncated, mistyped, or not in canonical form.
    #[error("corrupt {what} data: {reason}")]
    CorruptData { what: &'static str, reason: String },

    /// A value could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
