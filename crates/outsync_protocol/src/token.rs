//! Opaque server-issued values.
//!
//! Neither type is ever parsed on the client. They are stored and replayed
//! byte-for-byte so that future server formats keep working.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque cursor bounding an incremental pull.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeToken(Vec<u8>);

impl ChangeToken {
    /// Wraps server-issued bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeToken({} bytes)", self.0.len())
    }
}

/// Opaque record version metadata used for optimistic concurrency.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag(Vec<u8>);

impl VersionTag {
    /// Wraps server-issued bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionTag(")?;
        for byte in self.0.iter().take(8) {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}
