//! Entity, zone and record identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::RecordType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the zone a personal account stores its documents in.
pub const DEFAULT_ZONE_NAME: &str = "Outlines";

/// Owner name used for zones that belong to the signed-in user.
pub const DEFAULT_ZONE_OWNER: &str = "__defaultOwner__";

/// A server-side partition of records.
///
/// A zone shares one change token and one cascade-delete scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId {
    /// Zone name.
    pub name: String,
    /// Owner of the zone (another user's name for shared zones).
    pub owner: String,
}

impl ZoneId {
    /// Creates a zone identifier.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// The zone owned by the current user that holds personal documents.
    pub fn default_zone() -> Self {
        Self::new(DEFAULT_ZONE_NAME, DEFAULT_ZONE_OWNER)
    }

    /// Returns true if this zone belongs to the current user.
    pub fn is_owned(&self) -> bool {
        self.owner == DEFAULT_ZONE_OWNER
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.owner)
    }
}

/// Identifier of a single remote record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    /// Zone the record lives in.
    pub zone: ZoneId,
    /// Record name, unique within the zone.
    pub name: String,
}

impl RecordId {
    /// Creates a record identifier.
    pub fn new(zone: ZoneId, name: impl Into<String>) -> Self {
        Self {
            zone,
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.name)
    }
}

/// Hierarchical identifier of a syncable entity.
///
/// The string form is `kind:component_component...`. Components are
/// escaped so that encoding and decoding are lossless for any content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityId {
    /// An account.
    Account {
        /// Account number.
        account: u32,
    },
    /// A document (outline).
    Document {
        /// Account number.
        account: u32,
        /// Document identifier.
        document: String,
    },
    /// A row inside a document.
    Row {
        /// Account number.
        account: u32,
        /// Document identifier.
        document: String,
        /// Row identifier.
        row: String,
    },
    /// An image attachment inside a row.
    Image {
        /// Account number.
        account: u32,
        /// Document identifier.
        document: String,
        /// Row identifier.
        row: String,
        /// Image identifier.
        image: String,
    },
}

impl EntityId {
    /// Creates a document entity id.
    pub fn document(account: u32, document: impl Into<String>) -> Self {
        Self::Document {
            account,
            document: document.into(),
        }
    }

    /// Creates a row entity id.
    pub fn row(account: u32, document: impl Into<String>, row: impl Into<String>) -> Self {
        Self::Row {
            account,
            document: document.into(),
            row: row.into(),
        }
    }

    /// Creates an image entity id.
    pub fn image(
        account: u32,
        document: impl Into<String>,
        row: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self::Image {
            account,
            document: document.into(),
            row: row.into(),
            image: image.into(),
        }
    }

    /// Returns the account number.
    pub fn account_id(&self) -> u32 {
        match self {
            Self::Account { account }
            | Self::Document { account, .. }
            | Self::Row { account, .. }
            | Self::Image { account, .. } => *account,
        }
    }

    /// Returns the document identifier, if this id is inside a document.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Self::Account { .. } => None,
            Self::Document { document, .. }
            | Self::Row { document, .. }
            | Self::Image { document, .. } => Some(document),
        }
    }

    /// Returns the row identifier for rows and images.
    pub fn row_id(&self) -> Option<&str> {
        match self {
            Self::Row { row, .. } | Self::Image { row, .. } => Some(row),
            _ => None,
        }
    }

    /// Returns the image identifier for images.
    pub fn image_id(&self) -> Option<&str> {
        match self {
            Self::Image { image, .. } => Some(image),
            _ => None,
        }
    }

    /// Returns the id of the document that owns this entity.
    pub fn document_entity(&self) -> Option<EntityId> {
        self.document_id()
            .map(|document| EntityId::document(self.account_id(), document))
    }

    /// Returns the id of the row that owns this image.
    pub fn row_entity(&self) -> Option<EntityId> {
        match self {
            Self::Image {
                account,
                document,
                row,
                ..
            } => Some(EntityId::row(*account, document.clone(), row.clone())),
            _ => None,
        }
    }

    /// Returns the remote record type this entity maps to.
    pub fn record_type(&self) -> Option<RecordType> {
        match self {
            Self::Account { .. } => None,
            Self::Document { .. } => Some(RecordType::Document),
            Self::Row { .. } => Some(RecordType::Row),
            Self::Image { .. } => Some(RecordType::Image),
        }
    }

    /// Returns the deterministic record name for this entity.
    ///
    /// Accounts have no record of their own.
    pub fn record_name(&self) -> Option<String> {
        match self {
            Self::Account { .. } => None,
            Self::Document { document, .. } => Some(escape(document)),
            Self::Row { document, row, .. } => Some(format!("{}_{}", escape(document), escape(row))),
            Self::Image {
                document,
                row,
                image,
                ..
            } => Some(format!(
                "{}_{}_{}",
                escape(document),
                escape(row),
                escape(image)
            )),
        }
    }

    /// Returns the record id of this entity inside `zone`.
    pub fn record_id(&self, zone: &ZoneId) -> Option<RecordId> {
        self.record_name()
            .map(|name| RecordId::new(zone.clone(), name))
    }

    /// Reconstructs an entity id from a record name and type.
    pub fn from_record(account: u32, record_type: RecordType, name: &str) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidRecordName {
            record_type: record_type.as_str().to_string(),
            name: name.to_string(),
        };
        let parts = name
            .split('_')
            .map(unescape)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;

        match (record_type, parts.as_slice()) {
            (RecordType::Document, [document]) => Ok(Self::document(account, document.clone())),
            (RecordType::Row, [document, row]) => {
                Ok(Self::row(account, document.clone(), row.clone()))
            }
            (RecordType::Image, [document, row, image]) => Ok(Self::image(
                account,
                document.clone(),
                row.clone(),
                image.clone(),
            )),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account { account } => write!(f, "account:{account}"),
            Self::Document { account, document } => {
                write!(f, "document:{account}_{}", escape(document))
            }
            Self::Row {
                account,
                document,
                row,
            } => write!(f, "row:{account}_{}_{}", escape(document), escape(row)),
            Self::Image {
                account,
                document,
                row,
                image,
            } => write!(
                f,
                "image:{account}_{}_{}_{}",
                escape(document),
                escape(row),
                escape(image)
            ),
        }
    }
}

impl FromStr for EntityId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::invalid_entity_id(s);
        let (kind, rest) = s.split_once(':').ok_or_else(invalid)?;
        let mut parts = rest.split('_');
        let account = parts
            .next()
            .and_then(|a| a.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let components = parts
            .map(unescape)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;

        match (kind, components.as_slice()) {
            ("account", []) => Ok(Self::Account { account }),
            ("document", [document]) => Ok(Self::document(account, document.clone())),
            ("row", [document, row]) => Ok(Self::row(account, document.clone(), row.clone())),
            ("image", [document, row, image]) => Ok(Self::image(
                account,
                document.clone(),
                row.clone(),
                image.clone(),
            )),
            _ => Err(invalid()),
        }
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntityId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            ':' => out.push_str("%3A"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut rest = component;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 3)?;
        match code {
            "25" => out.push('%'),
            "5F" => out.push('_'),
            "3A" => out.push(':'),
            _ => return None,
        }
        rest = &rest[idx + 3..];
    }
    out.push_str(rest);
    Some(out)
}
