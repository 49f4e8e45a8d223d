//! Error types for rich text handling.

use thiserror::Error;

/// Result type for rich text operations.
pub type RichTextResult<T> = Result<T, RichTextError>;

/// Errors raised by rich text editing and encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RichTextError {
    /// An offset or range fell outside the text.
    #[error("range {start}..{end} out of bounds for text of length {len}")]
    OutOfBounds {
        /// Range start.
        start: usize,
        /// Range end.
        end: usize,
        /// Text length in characters.
        len: usize,
    },

    /// Encoding to the stored form failed.
    #[error("rich text encoding failed: {0}")]
    Encode(String),

    /// The stored form could not be decoded.
    #[error("rich text decoding failed: {0}")]
    Decode(String),
}
