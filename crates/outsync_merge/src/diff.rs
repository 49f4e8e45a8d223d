//! Edit scripts between two sequences.
//!
//! Scripts are computed with Myers' O((N+M)D) algorithm after trimming the
//! common prefix and suffix. Removal offsets refer to the old sequence,
//! insertion offsets to the new one; every insertion also records its
//! `anchor`, the old-sequence offset it was inserted in front of.

use std::collections::HashMap;
use std::hash::Hash;

/// An element removed from the old sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal<T> {
    /// Offset in the old sequence.
    pub offset: usize,
    /// The removed element.
    pub element: T,
    /// Offset of the matching insertion when this removal is half of a move.
    pub moved_to: Option<usize>,
}

/// An element inserted into the new sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion<T> {
    /// Offset in the new sequence.
    pub offset: usize,
    /// Offset in the old sequence this element was inserted before.
    pub anchor: usize,
    /// The inserted element.
    pub element: T,
    /// Offset of the matching removal when this insertion is half of a move.
    pub moved_from: Option<usize>,
}

/// Minimal set of removals and insertions turning one sequence into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditScript<T> {
    removals: Vec<Removal<T>>,
    insertions: Vec<Insertion<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Remove,
    Insert,
}

impl<T: Clone> EditScript<T> {
    /// Computes the script turning `old` into `new`.
    pub fn between(old: &[T], new: &[T]) -> Self
    where
        T: PartialEq,
    {
        Self::between_by(old, new, |a, b| a == b)
    }

    /// Computes the script using a custom equality.
    pub fn between_by<F>(old: &[T], new: &[T], eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool,
    {
        let mut removals = Vec::new();
        let mut insertions = Vec::new();
        let (mut i, mut j) = (0usize, 0usize);

        for step in shortest_edit(old, new, &eq) {
            match step {
                Step::Keep => {
                    i += 1;
                    j += 1;
                }
                Step::Remove => {
                    removals.push(Removal {
                        offset: i,
                        element: old[i].clone(),
                        moved_to: None,
                    });
                    i += 1;
                }
                Step::Insert => {
                    insertions.push(Insertion {
                        offset: j,
                        anchor: i,
                        element: new[j].clone(),
                        moved_from: None,
                    });
                    j += 1;
                }
            }
        }

        Self {
            removals,
            insertions,
        }
    }

    /// Pairs removals and insertions of the same element into moves.
    pub fn inferring_moves(self) -> Self
    where
        T: Eq + Hash,
    {
        self.inferring_moves_by(|element| element.clone())
    }

    /// Pairs removals and insertions whose keys match into moves.
    ///
    /// Only keys that are removed exactly once and inserted exactly once
    /// are paired; repeated keys stay plain removals and insertions.
    pub fn inferring_moves_by<K, F>(mut self, key: F) -> Self
    where
        K: Eq + Hash,
        F: Fn(&T) -> K,
    {
        let mut removed: HashMap<K, Option<usize>> = HashMap::new();
        for (idx, removal) in self.removals.iter().enumerate() {
            removed
                .entry(key(&removal.element))
                .and_modify(|slot| *slot = None)
                .or_insert(Some(idx));
        }

        let mut inserted: HashMap<K, Option<usize>> = HashMap::new();
        for (idx, insertion) in self.insertions.iter().enumerate() {
            inserted
                .entry(key(&insertion.element))
                .and_modify(|slot| *slot = None)
                .or_insert(Some(idx));
        }

        for (element_key, insertion_idx) in inserted {
            let (Some(insertion_idx), Some(Some(removal_idx))) =
                (insertion_idx, removed.get(&element_key))
            else {
                continue;
            };
            let removal_idx = *removal_idx;
            self.insertions[insertion_idx].moved_from = Some(self.removals[removal_idx].offset);
            self.removals[removal_idx].moved_to = Some(self.insertions[insertion_idx].offset);
        }

        self
    }
}

impl<T> EditScript<T> {
    /// Removals in ascending old-sequence order.
    pub fn removals(&self) -> &[Removal<T>] {
        &self.removals
    }

    /// Insertions in ascending new-sequence order.
    pub fn insertions(&self) -> &[Insertion<T>] {
        &self.insertions
    }

    /// Returns true if both sequences are equal.
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.insertions.is_empty()
    }

    /// Total number of removals and insertions.
    pub fn len(&self) -> usize {
        self.removals.len() + self.insertions.len()
    }
}

fn shortest_edit<T, F>(old: &[T], new: &[T], eq: &F) -> Vec<Step>
where
    F: Fn(&T, &T) -> bool,
{
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| eq(a, b))
        .count();
    let old_rest = &old[prefix..];
    let new_rest = &new[prefix..];
    let suffix = old_rest
        .iter()
        .rev()
        .zip(new_rest.iter().rev())
        .take_while(|(a, b)| eq(a, b))
        .count();

    let a = &old_rest[..old_rest.len() - suffix];
    let b = &new_rest[..new_rest.len() - suffix];

    let mut steps = vec![Step::Keep; prefix];
    steps.extend(myers(a, b, eq));
    steps.extend(std::iter::repeat(Step::Keep).take(suffix));
    steps
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn myers<T, F>(a: &[T], b: &[T], eq: &F) -> Vec<Step>
where
    F: Fn(&T, &T) -> bool,
{
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = a.len() + b.len();
    if max == 0 {
        return Vec::new();
    }

    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 2];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=offset {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && eq(&a[x as usize], &b[y as usize]) {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut steps = Vec::with_capacity(max);
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let idx = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            steps.push(Step::Keep);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            steps.push(if x == prev_x { Step::Insert } else { Step::Remove });
        }
        x = prev_x;
        y = prev_y;
    }

    steps.reverse();
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn replay<T: Clone>(old: &[T], script: &EditScript<T>) -> Vec<T> {
        let mut out: Vec<T> = old
            .iter()
            .enumerate()
            .filter(|(i, _)| !script.removals().iter().any(|r| r.offset == *i))
            .map(|(_, e)| e.clone())
            .collect();
        for insertion in script.insertions() {
            out.insert(insertion.offset, insertion.element.clone());
        }
        out
    }

    #[test]
    fn identical_sequences_have_empty_script() {
        let script = EditScript::between(&[1, 2, 3], &[1, 2, 3]);
        assert!(script.is_empty());
        assert_eq!(script.len(), 0);
    }

    #[test]
    fn single_insertion_records_anchor() {
        let script = EditScript::between(&['a', 'b', 'c'], &['a', 'b', 'x', 'c']);
        assert!(script.removals().is_empty());
        assert_eq!(
            script.insertions(),
            &[Insertion {
                offset: 2,
                anchor: 2,
                element: 'x',
                moved_from: None
            }]
        );
    }

    #[test]
    fn append_anchors_at_end() {
        let old: Vec<char> = "Hello world".chars().collect();
        let new: Vec<char> = "Hello world!".chars().collect();
        let script = EditScript::between(&old, &new);
        assert_eq!(script.insertions().len(), 1);
        assert_eq!(script.insertions()[0].anchor, 11);
        assert_eq!(script.insertions()[0].offset, 11);
    }

    #[test]
    fn removals_refer_to_old_offsets() {
        let script = EditScript::between(&[1, 2, 3, 4], &[1, 4]);
        let offsets: Vec<usize> = script.removals().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![1, 2]);
        assert!(script.insertions().is_empty());
    }

    #[test]
    fn swap_is_inferred_as_move() {
        let script = EditScript::between(&["A", "B", "C"], &["B", "A", "C"]).inferring_moves();
        assert_eq!(script.removals().len(), 1);
        assert_eq!(script.insertions().len(), 1);
        assert!(script.removals()[0].moved_to.is_some());
        assert!(script.insertions()[0].moved_from.is_some());
        assert_eq!(script.removals()[0].element, script.insertions()[0].element);
    }

    #[test]
    fn repeated_elements_are_not_paired() {
        let script = EditScript::between(&['a', 'a', 'b'], &['b', 'a', 'a']).inferring_moves();
        for removal in script.removals() {
            if removal.element == 'a' {
                assert!(removal.moved_to.is_none());
            }
        }
    }

    #[test]
    fn custom_equality_ignores_payload() {
        let old = [(1, "x"), (2, "y")];
        let new = [(1, "changed"), (2, "y")];
        let script = EditScript::between_by(&old, &new, |a, b| a.0 == b.0);
        assert!(script.is_empty());
    }

    proptest! {
        #[test]
        fn script_transforms_old_into_new(
            old in proptest::collection::vec(0u8..5, 0..24),
            new in proptest::collection::vec(0u8..5, 0..24),
        ) {
            let script = EditScript::between(&old, &new);
            prop_assert_eq!(replay(&old, &script), new);
        }

        #[test]
        fn anchors_are_monotone(
            old in proptest::collection::vec(0u8..4, 0..16),
            new in proptest::collection::vec(0u8..4, 0..16),
        ) {
            let script = EditScript::between(&old, &new);
            let anchors: Vec<usize> = script.insertions().iter().map(|i| i.anchor).collect();
            prop_assert!(anchors.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(anchors.iter().all(|a| *a <= old.len()));
        }
    }
}
