//! Error types for the record protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while interpreting protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An entity ID string did not have a recognised shape.
    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),

    /// A record name could not be mapped back to an entity.
    #[error("invalid record name {name:?} for {record_type}")]
    InvalidRecordName {
        /// The record type being decoded.
        record_type: String,
        /// The offending record name.
        name: String,
    },

    /// The record type tag is not one this client understands.
    #[error("unknown record type: {0}")]
    UnknownRecordType(String),

    /// A required field is absent or has the wrong type.
    #[error("record {record} is missing field {field}")]
    MissingField {
        /// Record name.
        record: String,
        /// Field name.
        field: &'static str,
    },
}

impl ProtocolError {
    /// Creates an invalid entity id error.
    pub fn invalid_entity_id(value: impl Into<String>) -> Self {
        Self::InvalidEntityId(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_entity_id("bogus");
        assert_eq!(err.to_string(), "invalid entity id: bogus");

        let err = ProtocolError::MissingField {
            record: "abc".into(),
            field: "title",
        };
        assert!(err.to_string().contains("title"));
    }
}
