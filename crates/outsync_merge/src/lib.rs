//! # Outsync Merge
//!
//! Three-way merging for syncable fields.
//!
//! This crate provides:
//! - The field merge decision table (`resolve`)
//! - Edit scripts with move inference (`EditScript`)
//! - Ordered-collection merging for id lists
//! - `RichText` and character-level rich-text merging
//! - Merge strategies selected by field kind
//!
//! Every function here is pure. Merges never fail: when no structural
//! merge applies, the client value is kept.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod diff;
mod error;
mod ordered;
mod resolve;
mod rich_text;
mod strategy;
mod text_merge;

pub use diff::{EditScript, Insertion, Removal};
pub use error::{RichTextError, RichTextResult};
pub use ordered::merge_ordered;
pub use resolve::{resolve, MergeOutcome};
pub use rich_text::{RichText, TextRun, TextStyle, TextUnit, OBJECT_REPLACEMENT};
pub use strategy::{merge_field, FieldKind, MergeStrategy, OrderedList, RichTextMerge, Scalar};
pub use text_merge::{merge_rich_text, OffsetCorrection};
