//! Envelope codec errors
//!
//! Every rejection carries the reason it happened so the receive path can
//! count and log failures even though callers only ever see "no message".

use thiserror::Error;
use types::TensorError;

/// Envelope encoding and decoding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Bytes are not a complete MessagePack value of a supported shape
    #[error("Malformed envelope: {reason}")]
    Malformed { reason: String },

    /// A complete value was decoded but bytes remain after it
    #[error("Trailing bytes after envelope: consumed {consumed} of {total}")]
    TrailingBytes { consumed: usize, total: usize },

    /// Top-level value is not a mapping
    #[error("Envelope root is a {kind}, expected a map")]
    NotAMap { kind: &'static str },

    /// Mapping decoded fine but carries no sentinel entry
    #[error("Envelope sentinel is missing")]
    MissingSentinel,

    /// Sentinel key present with the wrong value
    #[error("Envelope sentinel mismatch: found {found}")]
    SentinelMismatch { found: String },

    /// Sub-mapping looked like a tensor but a field is absent or mistyped
    #[error("Invalid tensor field '{field}': {reason}")]
    InvalidTensorField { field: &'static str, reason: String },

    /// Tensor fields were well-typed but do not describe a valid tensor
    #[error("Tensor reconstruction failed: {0}")]
    Tensor(#[from] TensorError),

    /// Serializer failure while encoding
    #[error("Failed to encode envelope: {reason}")]
    Encode { reason: String },
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn invalid_tensor_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidTensorField {
            field,
            reason: reason.into(),
        }
    }

    /// True when the bytes were valid MessagePack but not one of our envelopes
    pub fn is_sentinel_rejection(&self) -> bool {
        matches!(
            self,
            CodecError::MissingSentinel | CodecError::SentinelMismatch { .. }
        )
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            CodecError::Malformed { .. } => "malformed",
            CodecError::TrailingBytes { .. } => "trailing_bytes",
            CodecError::NotAMap { .. } => "not_a_map",
            CodecError::MissingSentinel => "missing_sentinel",
            CodecError::SentinelMismatch { .. } => "sentinel_mismatch",
            CodecError::InvalidTensorField { .. } => "invalid_tensor_field",
            CodecError::Tensor(_) => "tensor",
            CodecError::Encode { .. } => "encode",
        }
    }
}
