//! Error types for names and packets.

use thiserror::Error;

/// Result type for name operations.
pub type NameResult<T> = Result<T, NameError>;

/// Errors that can occur while parsing or manipulating names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// A percent escape was truncated or not hexadecimal.
    #[error("invalid percent escape in component {component:?}")]
    InvalidEscape {
        /// The offending component text.
        component: String,
    },

    /// A component made only of periods must have at least three.
    #[error("illegal period-only component {0:?}")]
    IllegalPeriods(String),

    /// The URI scheme is not `ndn:`.
    #[error("unsupported URI scheme in {0:?}")]
    UnsupportedScheme(String),

    /// A component index was out of range.
    #[error("component index {index} out of range for name of length {len}")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Name length.
        len: usize,
    },

    /// A component did not carry the expected naming-convention marker.
    #[error("component is not a {0} component")]
    WrongMarker(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = NameError::OutOfRange { index: 4, len: 2 };
        assert!(err.to_string().contains('4'));
        assert!(err.to_string().contains('2'));

        let err = NameError::WrongMarker("segment");
        assert_eq!(err.to_string(), "component is not a segment component");
    }
}
