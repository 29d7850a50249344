//! Error types for tensor construction and message building
//!
//! Tensor errors carry enough context to explain why a raw buffer could not
//! be interpreted as the declared shape and element type.

use thiserror::Error;

/// Errors raised while building or reinterpreting a [`crate::Tensor`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Element type name is not one of the canonical dtype names
    #[error("Unknown dtype '{name}'")]
    UnknownDType { name: String },

    /// Byte buffer does not match `product(shape) * width(dtype)`
    #[error("Tensor data is {actual} bytes, shape {shape:?} of {dtype} needs {expected}")]
    LengthMismatch {
        shape: Vec<usize>,
        dtype: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Element count overflows `usize`
    #[error("Tensor shape {shape:?} overflows the addressable element count")]
    ShapeOverflow { shape: Vec<usize> },

    /// Typed view requested with an element type that differs from the tensor dtype
    #[error("Tensor holds {actual} elements, requested {requested}")]
    DTypeMismatch {
        requested: &'static str,
        actual: &'static str,
    },
}

/// Errors raised while building a [`crate::StateMessage`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Caller tried to use the key reserved for the envelope sentinel
    #[error("Key '{key}' is reserved for the envelope sentinel")]
    ReservedKey { key: String },
}
