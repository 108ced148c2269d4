//! Type conversion error types.

use thiserror::Error;

/// Errors raised while decoding wire values or converting them to Rust types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// NULL where a value was required.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// The value has a different SQL type than requested.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Requested Rust type.
        expected: &'static str,
        /// SQL type of the value.
        actual: &'static str,
    },

    /// The value does not fit the requested type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// A value has a length its type does not allow.
    #[error("invalid {type_name} length: {len}")]
    InvalidLength {
        /// SQL type name.
        type_name: &'static str,
        /// Byte length received.
        len: usize,
    },

    /// Text is not valid in its encoding.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// Date or time components out of range.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// A wire type with no value mapping.
    #[error("unsupported SQL type: {0}")]
    UnsupportedType(String),

    /// No column has the requested name.
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    /// Column index past the end of the row.
    #[error("column index {index} out of bounds (row has {len} columns)")]
    ColumnIndex {
        /// Requested index.
        index: usize,
        /// Number of columns.
        len: usize,
    },
}

/// Result alias for type conversions.
pub type Result<T> = std::result::Result<T, TypeError>;
