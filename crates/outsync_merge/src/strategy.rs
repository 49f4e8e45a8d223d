//! Merge strategies selected by field kind.
//!
//! A field's type picks one strategy; `merge_field` runs the decision
//! table and calls the strategy only when both sides changed.

use crate::ordered::merge_ordered;
use crate::resolve::{resolve, MergeOutcome};
use crate::rich_text::RichText;
use crate::text_merge::merge_rich_text;
use std::hash::Hash;

/// The closed set of field kinds a syncable field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Plain value; the client wins a three-way merge.
    Scalar,
    /// Ordered, duplicate-free id list.
    OrderedList,
    /// Formatted text.
    RichText,
}

/// How a field of type `T` is merged when both sides changed.
pub trait MergeStrategy<T> {
    /// The kind this strategy implements.
    const KIND: FieldKind;

    /// Merges concurrent client and server edits against their ancestor.
    fn three_way(client: &T, ancestor: &T, server: &T) -> T;
}

/// Scalar strategy: the client value wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scalar;

impl<T: Clone> MergeStrategy<T> for Scalar {
    const KIND: FieldKind = FieldKind::Scalar;

    fn three_way(client: &T, _ancestor: &T, _server: &T) -> T {
        client.clone()
    }
}

/// Ordered-collection strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedList;

impl<T> MergeStrategy<Vec<T>> for OrderedList
where
    T: Clone + Eq + Hash,
{
    const KIND: FieldKind = FieldKind::OrderedList;

    fn three_way(client: &Vec<T>, ancestor: &Vec<T>, server: &Vec<T>) -> Vec<T> {
        merge_ordered(client, ancestor, server)
    }
}

/// Rich-text strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RichTextMerge;

impl MergeStrategy<RichText> for RichTextMerge {
    const KIND: FieldKind = FieldKind::RichText;

    fn three_way(client: &RichText, ancestor: &RichText, server: &RichText) -> RichText {
        merge_rich_text(client, ancestor, server)
    }
}

/// Resolves one field and returns the value that should be kept.
pub fn merge_field<T, S>(client: Option<&T>, ancestor: Option<&T>, server: Option<&T>) -> Option<T>
where
    T: Clone + PartialEq,
    S: MergeStrategy<T>,
{
    match resolve(client, ancestor, server) {
        MergeOutcome::ClientWins => client.cloned(),
        MergeOutcome::ServerWins => server.cloned(),
        MergeOutcome::ThreeWayMerge => match (client, ancestor, server) {
            (Some(client), Some(ancestor), Some(server)) => {
                Some(S::three_way(client, ancestor, server))
            }
            _ => client.cloned(),
        },
    }
}
