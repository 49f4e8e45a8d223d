//! Ordered-collection merging.

use crate::diff::EditScript;
use std::collections::HashSet;
use std::hash::Hash;

/// Merges an ordered, duplicate-free id list.
///
/// Only the server's insertions relative to `ancestor` are replayed onto
/// `client`, at the server offset clamped to the current length. Server
/// removals are ignored, so an element the client still holds is kept.
///
/// A server move (a removal and insertion of the same element) relocates
/// the element only if the client still holds it; an element the client
/// removed is not resurrected. A server move takes precedence over a
/// concurrent client move of the same element: the element ends up at the
/// server's offset, wherever the client put it. Plain insertions of an
/// element the client already holds are skipped, so every element appears
/// exactly once.
pub fn merge_ordered<T>(client: &[T], ancestor: &[T], server: &[T]) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let script = EditScript::between(ancestor, server).inferring_moves();
    let mut merged = client.to_vec();
    let mut present: HashSet<T> = merged.iter().cloned().collect();

    for insertion in script.insertions() {
        let element = &insertion.element;

        if insertion.moved_from.is_some() {
            let Some(current) = merged.iter().position(|e| e == element) else {
                continue;
            };
            merged.remove(current);
            let offset = insertion.offset.min(merged.len());
            merged.insert(offset, element.clone());
            continue;
        }

        if present.contains(element) {
            continue;
        }
        let offset = insertion.offset.min(merged.len());
        merged.insert(offset, element.clone());
        present.insert(element.clone());
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn client_move_with_server_insert() {
        let merged = merge_ordered(&ids("BAC"), &ids("ABC"), &ids("ABDC"));
        assert_eq!(merged, ids("BADC"));
    }

    #[test]
    fn server_removal_is_not_replayed() {
        let merged = merge_ordered(&ids("ABCX"), &ids("ABC"), &ids("AC"));
        assert_eq!(merged, ids("ABCX"));
    }

    #[test]
    fn insertion_offset_is_clamped() {
        // Client dropped most of the list, server appended at the end
        let merged = merge_ordered(&ids("A"), &ids("ABCD"), &ids("ABCDE"));
        assert_eq!(merged, ids("AE"));
    }

    #[test]
    fn both_insert_same_element() {
        let merged = merge_ordered(&ids("ABX"), &ids("AB"), &ids("AXB"));
        assert_eq!(merged, ids("ABX"));
    }

    #[test]
    fn server_move_relocates_client_element() {
        let merged = merge_ordered(&ids("ABCD"), &ids("ABC"), &ids("BCA"));
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.iter().filter(|c| **c == 'A').count(), 1);
        assert!(merged.contains(&'D'));
    }

    #[test]
    fn server_move_does_not_resurrect_client_removal() {
        let merged = merge_ordered(&ids("BC"), &ids("ABC"), &ids("BCA"));
        assert_eq!(merged, ids("BC"));
    }

    #[test]
    fn server_move_overrides_client_move() {
        // Both sides moved A; the server's placement wins
        let merged = merge_ordered(&ids("BACD"), &ids("ABCD"), &ids("BCDA"));
        assert_eq!(merged, ids("BCDA"));
    }

    #[test]
    fn tag_names_merge() {
        let client = vec!["work".to_string(), "home".to_string()];
        let ancestor = vec!["work".to_string()];
        let server = vec!["urgent".to_string(), "work".to_string()];
        let merged = merge_ordered(&client, &ancestor, &server);
        assert_eq!(merged, vec!["urgent", "work", "home"]);
    }

    fn unique_list(max: usize) -> impl Strategy<Value = Vec<u8>> {
        proptest::sample::subsequence((0u8..12).collect::<Vec<_>>(), 0..max)
            .prop_shuffle()
    }

    proptest! {
        #[test]
        fn merge_keeps_every_client_element_once(
            client in unique_list(10),
            ancestor in unique_list(10),
            server in unique_list(10),
        ) {
            let merged = merge_ordered(&client, &ancestor, &server);
            for element in &client {
                prop_assert_eq!(merged.iter().filter(|e| *e == element).count(), 1);
            }
            let unique: HashSet<_> = merged.iter().collect();
            prop_assert_eq!(unique.len(), merged.len());
        }

        #[test]
        fn server_insertions_appear(
            client in unique_list(8),
            ancestor in unique_list(8),
            server in unique_list(8),
        ) {
            let merged = merge_ordered(&client, &ancestor, &server);
            for element in server.iter().filter(|e| !ancestor.contains(e)) {
                prop_assert!(merged.contains(element));
            }
        }
    }
}
