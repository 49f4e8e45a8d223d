//! Remote record representation.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::RecordId;
use crate::token::VersionTag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field names used by the record types.
pub mod fields {
    /// Document title.
    pub const TITLE: &str = "title";
    /// Disambiguator appended to duplicate document titles.
    pub const DISAMBIGUATOR: &str = "disambiguator";
    /// Document owner name.
    pub const OWNER_NAME: &str = "ownerName";
    /// Document owner email.
    pub const OWNER_EMAIL: &str = "ownerEmail";
    /// Document owner URL.
    pub const OWNER_URL: &str = "ownerURL";
    /// Document creation timestamp.
    pub const CREATED: &str = "created";
    /// Document update timestamp.
    pub const UPDATED: &str = "updated";
    /// Ordered tag names.
    pub const TAG_NAMES: &str = "tagNames";
    /// Ordered child row ids.
    pub const ROW_ORDER: &str = "rowOrder";
    /// Ordered links to other documents.
    pub const DOCUMENT_LINKS: &str = "documentLinks";
    /// Row topic rich text.
    pub const TOPIC: &str = "topicData";
    /// Row note rich text.
    pub const NOTE: &str = "noteData";
    /// Row completion flag.
    pub const IS_COMPLETE: &str = "isComplete";
    /// Image placement flag.
    pub const IS_IN_NOTES: &str = "isInNotes";
    /// Image character offset.
    pub const OFFSET: &str = "offset";
    /// Image payload asset.
    pub const ASSET: &str = "asset";
}

/// The type tag of a remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    /// A document (outline).
    Document,
    /// A row.
    Row,
    /// An image attachment.
    Image,
}

impl RecordType {
    /// Returns the wire name of this record type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Document => "Outline",
            RecordType::Row => "Row",
            RecordType::Image => "Image",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Outline" => Ok(RecordType::Document),
            "Row" => Ok(RecordType::Row),
            "Image" => Ok(RecordType::Image),
            other => Err(ProtocolError::UnknownRecordType(other.to_string())),
        }
    }
}

/// A value stored in a record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// UTF-8 string.
    Text(String),
    /// Native boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Timestamp in milliseconds since the Unix epoch.
    Date(i64),
    /// List of strings.
    TextList(Vec<String>),
    /// Inline binary value.
    Bytes(Vec<u8>),
    /// Binary asset payload stored out of line by the remote store.
    Asset(Vec<u8>),
}

/// A single record in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Type tag.
    pub record_type: RecordType,
    /// Parent record; deleting the parent deletes this record server-side.
    pub parent: Option<RecordId>,
    /// Named fields.
    pub fields: BTreeMap<String, FieldValue>,
    /// Server version metadata, round-tripped unmodified.
    pub version: Option<VersionTag>,
}

impl RemoteRecord {
    /// Creates an empty record.
    pub fn new(id: RecordId, record_type: RecordType) -> Self {
        Self {
            id,
            record_type,
            parent: None,
            fields: BTreeMap::new(),
            version: None,
        }
    }

    /// Sets the parent reference.
    pub fn with_parent(mut self, parent: Option<RecordId>) -> Self {
        self.parent = parent;
        self
    }

    /// Sets the version metadata.
    pub fn with_version(mut self, version: Option<VersionTag>) -> Self {
        self.version = version;
        self
    }

    /// Sets a field.
    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    /// Sets a field, or removes it when `value` is `None`.
    pub fn set_opt(&mut self, name: &str, value: Option<FieldValue>) {
        match value {
            Some(value) => self.set(name, value),
            None => {
                self.fields.remove(name);
            }
        }
    }

    /// Returns a raw field value.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns a string field.
    pub fn get_text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            FieldValue::Text(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns a boolean field.
    ///
    /// Accepts native booleans, `"0"`/`"1"` strings and integers.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            FieldValue::Bool(value) => Some(*value),
            FieldValue::Text(value) => match value.as_str() {
                "1" => Some(true),
                "0" => Some(false),
                _ => None,
            },
            FieldValue::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }

    /// Returns an integer field.
    pub fn get_integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a timestamp field in milliseconds.
    pub fn get_date(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FieldValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a string list field.
    pub fn get_text_list(&self, name: &str) -> Option<Vec<String>> {
        match self.get(name)? {
            FieldValue::TextList(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns an inline binary field.
    pub fn get_bytes(&self, name: &str) -> Option<Vec<u8>> {
        match self.get(name)? {
            FieldValue::Bytes(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns an asset payload.
    pub fn get_asset(&self, name: &str) -> Option<Vec<u8>> {
        match self.get(name)? {
            FieldValue::Asset(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns a field or a missing-field error.
    pub fn require_text(&self, name: &'static str) -> ProtocolResult<String> {
        self.get_text(name).ok_or_else(|| ProtocolError::MissingField {
            record: self.id.name.clone(),
            field: name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ZoneId;

    fn record() -> RemoteRecord {
        RemoteRecord::new(RecordId::new(ZoneId::default_zone(), "D"), RecordType::Document)
    }

    #[test]
    fn record_type_names() {
        assert_eq!(RecordType::Document.as_str(), "Outline");
        assert_eq!("Row".parse::<RecordType>().unwrap(), RecordType::Row);
        assert!(matches!(
            "Folder".parse::<RecordType>(),
            Err(ProtocolError::UnknownRecordType(_))
        ));
    }

    #[test]
    fn bool_accepts_string_encoding() {
        let mut record = record();
        record.set("a", FieldValue::Text("1".into()));
        record.set("b", FieldValue::Text("0".into()));
        record.set("c", FieldValue::Bool(true));
        record.set("d", FieldValue::Text("yes".into()));

        assert_eq!(record.get_bool("a"), Some(true));
        assert_eq!(record.get_bool("b"), Some(false));
        assert_eq!(record.get_bool("c"), Some(true));
        assert_eq!(record.get_bool("d"), None);
        assert_eq!(record.get_bool("missing"), None);
    }

    #[test]
    fn typed_accessors_reject_other_types() {
        let mut record = record();
        record.set(fields::TITLE, FieldValue::Integer(3));
        assert_eq!(record.get_text(fields::TITLE), None);
        assert!(record.require_text(fields::TITLE).is_err());
    }

    #[test]
    fn set_opt_removes() {
        let mut record = record();
        record.set_opt(fields::TITLE, Some(FieldValue::Text("x".into())));
        assert_eq!(record.get_text(fields::TITLE).as_deref(), Some("x"));
        record.set_opt(fields::TITLE, None);
        assert!(record.get(fields::TITLE).is_none());
    }
}
