//! Character-level three-way merge of rich text.

use crate::diff::EditScript;
use crate::rich_text::{RichText, TextUnit};
use std::collections::HashSet;

/// Maps ancestor offsets to offsets in the client's current text.
///
/// The shift at an ancestor offset counts client insertions anchored at or
/// before it minus client removals strictly before it, so a server change
/// at the same point as a client insertion lands after the inserted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCorrection {
    shifts: Vec<isize>,
}

impl OffsetCorrection {
    /// Builds the table from the client's edit script against the ancestor.
    pub fn from_script<T>(script: &EditScript<T>, ancestor_len: usize) -> Self {
        let mut deltas = vec![0isize; ancestor_len + 2];
        for insertion in script.insertions() {
            deltas[insertion.anchor.min(ancestor_len)] += 1;
        }
        for removal in script.removals() {
            deltas[(removal.offset + 1).min(ancestor_len + 1)] -= 1;
        }

        let mut shifts = Vec::with_capacity(ancestor_len + 1);
        let mut running = 0isize;
        for delta in deltas.iter().take(ancestor_len + 1) {
            running += delta;
            shifts.push(running);
        }
        Self { shifts }
    }

    /// Translates an ancestor offset into the client's text.
    #[allow(clippy::cast_possible_wrap)]
    pub fn translate(&self, ancestor_offset: usize) -> isize {
        let shift = match self.shifts.get(ancestor_offset) {
            Some(shift) => *shift,
            None => self.shifts.last().copied().unwrap_or(0),
        };
        ancestor_offset as isize + shift
    }
}

/// Merges concurrent edits to rich text.
///
/// The client's text and formatting are kept; the server's insertions are
/// spliced in at offsets corrected for the client's own edits, carrying
/// the server's formatting. Server removals delete the client character at
/// the corrected offset when it is still in range and are dropped otherwise.
/// A character removed on both sides is removed once.
///
/// When the server changed no characters relative to the ancestor, the
/// client text is returned unchanged, even if the server changed styles.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn merge_rich_text(client: &RichText, ancestor: &RichText, server: &RichText) -> RichText {
    let same_char = |a: &TextUnit, b: &TextUnit| a.ch == b.ch;

    let server_script = EditScript::between_by(ancestor.units(), server.units(), same_char);
    if server_script.is_empty() {
        return client.clone();
    }

    let client_script = EditScript::between_by(ancestor.units(), client.units(), same_char);
    let correction = OffsetCorrection::from_script(&client_script, ancestor.len());
    let client_len = client.len();

    // A unit the client already removed has no client position.
    let client_removed: HashSet<usize> = client_script
        .removals()
        .iter()
        .map(|removal| removal.offset)
        .collect();

    // Positions below are in the client's current text, before any splice.
    let removed: HashSet<usize> = server_script
        .removals()
        .iter()
        .filter(|removal| !client_removed.contains(&removal.offset))
        .map(|removal| correction.translate(removal.offset))
        .filter(|position| *position >= 0 && (*position as usize) < client_len)
        .map(|position| position as usize)
        .collect();

    let mut inserted: Vec<(usize, &TextUnit)> = server_script
        .insertions()
        .iter()
        .map(|insertion| {
            let position = correction
                .translate(insertion.anchor)
                .clamp(0, client_len as isize) as usize;
            (position, &server.units()[insertion.offset])
        })
        .collect();
    // Stable sort keeps insertions sharing a position in server order.
    inserted.sort_by_key(|(position, _)| *position);

    let mut units = Vec::with_capacity(client_len + inserted.len());
    let mut pending = inserted.into_iter().peekable();
    for position in 0..=client_len {
        while let Some((_, unit)) = pending.next_if(|(at, _)| *at == position) {
            units.push(unit.clone());
        }
        if position < client_len && !removed.contains(&position) {
            units.push(client.units()[position].clone());
        }
    }

    RichText::from_units(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rich_text::TextStyle;
    use proptest::prelude::*;

    #[test]
    fn server_append_is_shifted_past_client_insertion() {
        let ancestor = RichText::plain("Hello world");
        let client = RichText::plain("Hello there world");
        let server = RichText::plain("Hello world!");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "Hello there world!");
    }

    #[test]
    fn server_insertion_before_client_insertion() {
        let ancestor = RichText::plain("abc");
        let client = RichText::plain("abcX");
        let server = RichText::plain("Yabc");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "YabcX");
    }

    #[test]
    fn server_removal_is_corrected() {
        let ancestor = RichText::plain("one two three");
        let client = RichText::plain("zero one two three");
        let server = RichText::plain("one three");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "zero one three");
    }

    #[test]
    fn out_of_range_removal_is_dropped() {
        let ancestor = RichText::plain("abcdef");
        let client = RichText::plain("ab");
        let server = RichText::plain("abcde");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "ab");
    }

    #[test]
    fn inserted_text_keeps_server_formatting() {
        let ancestor = RichText::plain("note");
        let client = RichText::styled("note", &TextStyle::italic());
        let mut server = RichText::plain("note ");
        server.push_str("bold", &TextStyle::bold());

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "note bold");
        assert!(merged.units()[0].style.italic);
        assert!(merged.units()[5].style.bold);
        assert!(!merged.units()[5].style.italic);
    }

    #[test]
    fn style_only_server_change_keeps_client() {
        let ancestor = RichText::plain("same");
        let client = RichText::plain("same, edited");
        let server = RichText::styled("same", &TextStyle::bold());

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged, client);
    }

    #[test]
    fn identical_removal_is_applied_once() {
        let ancestor = RichText::plain("abc");
        let client = RichText::plain("ac");
        let server = RichText::plain("ac");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "ac");
    }

    #[test]
    fn overlapping_removals_keep_untouched_text() {
        let ancestor = RichText::plain("keep this word here");
        let client = RichText::plain("keep here");
        let server = RichText::plain("keep word here");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "keep here");
    }

    #[test]
    fn partially_overlapping_removals_combine() {
        let ancestor = RichText::plain("abcdef");
        let client = RichText::plain("af");
        let server = RichText::plain("abef");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "af");
    }

    #[test]
    fn disjoint_removals_both_apply() {
        let ancestor = RichText::plain("one two three");
        let client = RichText::plain("one three");
        let server = RichText::plain("two three");

        let merged = merge_rich_text(&client, &ancestor, &server);
        assert_eq!(merged.to_string(), "three");
    }

    #[test]
    fn correction_table_is_monotone() {
        let ancestor: Vec<char> = "abcdef".chars().collect();
        let client: Vec<char> = "xxabdefyy".chars().collect();
        let script = EditScript::between(&ancestor, &client);
        let table = OffsetCorrection::from_script(&script, ancestor.len());

        let positions: Vec<isize> = (0..=ancestor.len()).map(|i| table.translate(i)).collect();
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(table.translate(0), 2);
        assert_eq!(table.translate(6), 9);
    }

    /// Keeps the characters of `text` whose position is not in `dropped`.
    fn without(text: &str, dropped: &[bool]) -> String {
        text.chars()
            .zip(dropped.iter().chain(std::iter::repeat(&false)))
            .filter(|(_, drop)| !**drop)
            .map(|(ch, _)| ch)
            .collect()
    }

    proptest! {
        #[test]
        fn client_insertions_survive_server_removals(
            ancestor in "[a-c]{0,12}",
            cuts in proptest::collection::vec(any::<bool>(), 12),
            inserts in proptest::collection::vec((0usize..13, "[X-Z]"), 0..4),
        ) {
            let server = without(&ancestor, &cuts);
            let mut client: Vec<char> = ancestor.chars().collect();
            for (at, text) in &inserts {
                let at = (*at).min(client.len());
                for (i, ch) in text.chars().enumerate() {
                    client.insert(at + i, ch);
                }
            }
            let client: String = client.into_iter().collect();

            let merged = merge_rich_text(
                &RichText::plain(&client),
                &RichText::plain(&ancestor),
                &RichText::plain(&server),
            )
            .to_string();

            let inserted: String = client.chars().filter(char::is_ascii_uppercase).collect();
            let kept: String = merged.chars().filter(char::is_ascii_uppercase).collect();
            prop_assert_eq!(kept, inserted);
            let rest: String = merged.chars().filter(|c| !c.is_ascii_uppercase()).collect();
            prop_assert_eq!(rest, server);
        }

        #[test]
        fn same_removal_on_both_sides_is_idempotent(
            ancestor in "[a-c ]{0,12}",
            cuts in proptest::collection::vec(any::<bool>(), 12),
        ) {
            let edited = without(&ancestor, &cuts);
            let merged = merge_rich_text(
                &RichText::plain(&edited),
                &RichText::plain(&ancestor),
                &RichText::plain(&edited),
            );
            prop_assert_eq!(merged.to_string(), edited);
        }
    }
}
