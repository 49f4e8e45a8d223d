//! Formatted text.
//!
//! `RichText` stores one `TextUnit` per character so that merges can work
//! on character offsets directly. The stored form coalesces units into
//! runs of equal style and is encoded as CBOR.

use crate::error::{RichTextError, RichTextResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Placeholder character standing in for an inline image.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Formatting attributes of a character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextStyle {
    /// Bold face.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    /// Italic face.
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    /// Strikethrough.
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    /// Link target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Image attachment id carried by an object replacement character.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TextStyle {
    /// Returns a bold style.
    pub fn bold() -> Self {
        Self {
            bold: true,
            ..Self::default()
        }
    }

    /// Returns an italic style.
    pub fn italic() -> Self {
        Self {
            italic: true,
            ..Self::default()
        }
    }
}

/// A single character with its formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextUnit {
    /// The character.
    pub ch: char,
    /// Its formatting.
    pub style: TextStyle,
}

/// A run of characters sharing one style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    /// Run text.
    pub text: String,
    /// Run style.
    #[serde(default)]
    pub style: TextStyle,
}

/// Formatted text with inline image attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<TextRun>", into = "Vec<TextRun>")]
pub struct RichText {
    units: Vec<TextUnit>,
}

impl RichText {
    /// Creates empty text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates unformatted text.
    pub fn plain(text: &str) -> Self {
        Self::styled(text, &TextStyle::default())
    }

    /// Creates text with a single style.
    pub fn styled(text: &str, style: &TextStyle) -> Self {
        Self {
            units: text
                .chars()
                .map(|ch| TextUnit {
                    ch,
                    style: style.clone(),
                })
                .collect(),
        }
    }

    /// Creates text from units.
    pub fn from_units(units: Vec<TextUnit>) -> Self {
        Self { units }
    }

    /// Returns the characters with their formatting.
    pub fn units(&self) -> &[TextUnit] {
        &self.units
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if there are no characters.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns true if both texts hold the same characters, ignoring style.
    pub fn same_text(&self, other: &RichText) -> bool {
        self.units.len() == other.units.len()
            && self.units.iter().zip(&other.units).all(|(a, b)| a.ch == b.ch)
    }

    /// Appends text in the given style.
    pub fn push_str(&mut self, text: &str, style: &TextStyle) {
        self.units.extend(text.chars().map(|ch| TextUnit {
            ch,
            style: style.clone(),
        }));
    }

    /// Inserts text at a character offset.
    pub fn insert_str(&mut self, offset: usize, text: &str, style: &TextStyle) -> RichTextResult<()> {
        self.check_range(offset..offset)?;
        let inserted = text.chars().map(|ch| TextUnit {
            ch,
            style: style.clone(),
        });
        self.units.splice(offset..offset, inserted);
        Ok(())
    }

    /// Inserts an image placeholder at a character offset.
    pub fn insert_image(&mut self, offset: usize, image_id: impl Into<String>) -> RichTextResult<()> {
        let style = TextStyle {
            image: Some(image_id.into()),
            ..TextStyle::default()
        };
        self.insert_str(offset, &OBJECT_REPLACEMENT.to_string(), &style)
    }

    /// Removes a character range.
    pub fn remove(&mut self, range: Range<usize>) -> RichTextResult<()> {
        self.check_range(range.clone())?;
        self.units.drain(range);
        Ok(())
    }

    /// Updates the style of a character range.
    pub fn restyle<F>(&mut self, range: Range<usize>, mut f: F) -> RichTextResult<()>
    where
        F: FnMut(&mut TextStyle),
    {
        self.check_range(range.clone())?;
        for unit in &mut self.units[range] {
            f(&mut unit.style);
        }
        Ok(())
    }

    /// Ids of the images referenced inline, in text order.
    pub fn image_ids(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter(|unit| unit.ch == OBJECT_REPLACEMENT)
            .filter_map(|unit| unit.style.image.as_deref())
            .collect()
    }

    /// Coalesces the text into runs of equal style.
    pub fn runs(&self) -> Vec<TextRun> {
        let mut runs: Vec<TextRun> = Vec::new();
        for unit in &self.units {
            match runs.last_mut() {
                Some(run) if run.style == unit.style => run.text.push(unit.ch),
                _ => runs.push(TextRun {
                    text: unit.ch.to_string(),
                    style: unit.style.clone(),
                }),
            }
        }
        runs
    }

    /// Encodes to the stored form.
    pub fn to_bytes(&self) -> RichTextResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out).map_err(|e| RichTextError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// Decodes from the stored form.
    pub fn from_bytes(bytes: &[u8]) -> RichTextResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| RichTextError::Decode(e.to_string()))
    }

    fn check_range(&self, range: Range<usize>) -> RichTextResult<()> {
        if range.start > range.end || range.end > self.units.len() {
            return Err(RichTextError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: self.units.len(),
            });
        }
        Ok(())
    }
}

impl From<Vec<TextRun>> for RichText {
    fn from(runs: Vec<TextRun>) -> Self {
        let mut text = RichText::new();
        for run in &runs {
            text.push_str(&run.text, &run.style);
        }
        text
    }
}

impl From<RichText> for Vec<TextRun> {
    fn from(text: RichText) -> Self {
        text.runs()
    }
}

impl fmt::Display for RichText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for unit in &self.units {
            write!(f, "{}", unit.ch)?;
        }
        Ok(())
    }
}
