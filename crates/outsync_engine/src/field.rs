//! Syncable fields with shadow slots.

use outsync_merge::{merge_field, MergeStrategy};
use std::fmt;
use std::marker::PhantomData;

/// One syncable field: the client value plus the ancestor and server
/// shadows used for merging.
///
/// The ancestor is captured lazily on the first local edit after a sync
/// and the server slot is filled only while a rejected save is being
/// merged. Both are cleared once the merge is confirmed.
pub struct SyncField<T, S> {
    client: Option<T>,
    ancestor: Option<T>,
    server: Option<T>,
    _strategy: PhantomData<S>,
}

impl<T, S> SyncField<T, S>
where
    T: Clone + PartialEq,
    S: MergeStrategy<T>,
{
    /// Creates a field holding a client value.
    pub fn new(value: Option<T>) -> Self {
        Self {
            client: value,
            ancestor: None,
            server: None,
            _strategy: PhantomData,
        }
    }

    /// Returns the client value.
    pub fn get(&self) -> Option<&T> {
        self.client.as_ref()
    }

    /// Returns the ancestor shadow.
    pub fn ancestor(&self) -> Option<&T> {
        self.ancestor.as_ref()
    }

    /// Returns the server shadow.
    pub fn server(&self) -> Option<&T> {
        self.server.as_ref()
    }

    /// Returns true if the field was edited since the last confirmed sync.
    pub fn has_local_changes(&self) -> bool {
        self.ancestor.is_some()
    }

    /// Applies a local edit. Returns true if the value changed.
    ///
    /// `tracked` is true when the owning entity has been synced before;
    /// only then is the previous value kept as the ancestor.
    pub fn set(&mut self, value: Option<T>, tracked: bool) -> bool {
        if self.client == value {
            return false;
        }
        if tracked && self.ancestor.is_none() {
            self.ancestor = self.client.clone();
        }
        self.client = value;
        true
    }

    /// Stores the value of a server record that rejected our save.
    ///
    /// If an earlier conflict was already merged into the client value,
    /// that server value becomes the new ancestor.
    pub fn set_server(&mut self, value: Option<T>) {
        if let Some(previous) = self.server.take() {
            self.ancestor = Some(previous);
        }
        self.server = value;
    }

    /// Resolves the three slots and stores the winner as the client value.
    pub fn resolve(&mut self) -> Option<&T> {
        let merged = merge_field::<T, S>(
            self.client.as_ref(),
            self.ancestor.as_ref(),
            self.server.as_ref(),
        );
        self.client = merged;
        self.client.as_ref()
    }

    /// Applies a pulled server value. Returns true if the client value changed.
    ///
    /// Without local edits the server value is taken as is. With local
    /// edits the values are merged, and the server value becomes the new
    /// ancestor while the client still differs from it.
    pub fn apply_remote(&mut self, value: Option<T>) -> bool {
        let merged = if self.ancestor.is_some() {
            merge_field::<T, S>(self.client.as_ref(), self.ancestor.as_ref(), value.as_ref())
        } else {
            value.clone()
        };

        let changed = merged != self.client;
        self.client = merged;
        self.ancestor = if self.ancestor.is_some() && self.client != value {
            value
        } else {
            None
        };
        self.server = None;
        changed
    }

    /// Clears the shadow slots once `saved` has been confirmed remotely.
    ///
    /// A client value that moved on after the record was built keeps
    /// `saved` as its ancestor, so a later conflict still merges it.
    pub fn clear_sync_data(&mut self, saved: Option<T>) {
        self.ancestor = if self.client == saved { None } else { saved };
        self.server = None;
    }
}

impl<T: Clone, S> Clone for SyncField<T, S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            ancestor: self.ancestor.clone(),
            server: self.server.clone(),
            _strategy: PhantomData,
        }
    }
}

impl<T: fmt::Debug, S> fmt::Debug for SyncField<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncField")
            .field("client", &self.client)
            .field("ancestor", &self.ancestor)
            .field("server", &self.server)
            .finish()
    }
}

impl<T, S> Default for SyncField<T, S> {
    fn default() -> Self {
        Self {
            client: None,
            ancestor: None,
            server: None,
            _strategy: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outsync_merge::{OrderedList, RichText, RichTextMerge, Scalar};

    #[test]
    fn untracked_edit_does_not_capture_ancestor() {
        let mut field: SyncField<String, Scalar> = SyncField::new(None);
        assert!(field.set(Some("a".into()), false));
        assert!(!field.has_local_changes());
    }

    #[test]
    fn ancestor_captured_once() {
        let mut field: SyncField<String, Scalar> = SyncField::new(Some("synced".into()));
        field.set(Some("edit 1".into()), true);
        field.set(Some("edit 2".into()), true);

        assert_eq!(field.ancestor().map(String::as_str), Some("synced"));
        assert_eq!(field.get().map(String::as_str), Some("edit 2"));
    }

    #[test]
    fn setting_same_value_is_noop() {
        let mut field: SyncField<bool, Scalar> = SyncField::new(Some(true));
        assert!(!field.set(Some(true), true));
        assert!(!field.has_local_changes());
    }

    #[test]
    fn conflict_resolves_ordered_list() {
        let ids = |s: &str| s.chars().map(|c| c.to_string()).collect::<Vec<_>>();
        let mut field: SyncField<Vec<String>, OrderedList> = SyncField::new(Some(ids("ABC")));
        field.set(Some(ids("BAC")), true);
        field.set_server(Some(ids("ABDC")));

        assert_eq!(field.resolve(), Some(&ids("BADC")));
    }

    #[test]
    fn repeated_conflict_advances_ancestor() {
        let mut field: SyncField<RichText, RichTextMerge> =
            SyncField::new(Some(RichText::plain("Hello world")));
        field.set(Some(RichText::plain("Hello there world")), true);

        field.set_server(Some(RichText::plain("Hello world!")));
        field.resolve();
        assert_eq!(field.get().unwrap().to_string(), "Hello there world!");

        // The server moved on again before our save landed
        field.set_server(Some(RichText::plain("Hello world!!")));
        field.resolve();
        assert_eq!(field.get().unwrap().to_string(), "Hello there world!!");
    }

    #[test]
    fn pull_without_local_changes_takes_server() {
        let mut field: SyncField<String, Scalar> = SyncField::new(Some("old".into()));
        assert!(field.apply_remote(None));
        assert_eq!(field.get(), None);
    }

    #[test]
    fn pull_with_local_changes_rebases() {
        let mut field: SyncField<RichText, RichTextMerge> =
            SyncField::new(Some(RichText::plain("Hello world")));
        field.set(Some(RichText::plain("Hello there world")), true);

        assert!(field.apply_remote(Some(RichText::plain("Hello world!"))));
        assert_eq!(field.get().unwrap().to_string(), "Hello there world!");
        assert_eq!(field.ancestor().unwrap().to_string(), "Hello world!");

        // Applying the same pull again changes nothing
        assert!(!field.apply_remote(Some(RichText::plain("Hello world!"))));
        assert_eq!(field.get().unwrap().to_string(), "Hello there world!");
    }

    #[test]
    fn clear_sync_data_drops_shadows() {
        let mut field: SyncField<i64, Scalar> = SyncField::new(Some(1));
        field.set(Some(2), true);
        field.set_server(Some(3));
        field.clear_sync_data(Some(2));

        assert!(field.ancestor().is_none());
        assert!(field.server().is_none());
        assert_eq!(field.get(), Some(&2));
    }

    #[test]
    fn edit_after_save_keeps_saved_value_as_ancestor() {
        let mut field: SyncField<String, Scalar> = SyncField::new(Some("A".into()));
        field.set(Some("B".into()), true);
        let sent = field.resolve().cloned();

        // Edited again before the save was confirmed
        field.set(Some("C".into()), true);
        field.clear_sync_data(sent);
        assert_eq!(field.ancestor().map(String::as_str), Some("B"));

        field.set_server(Some("X".into()));
        assert_eq!(field.resolve().map(String::as_str), Some("C"));
    }
}
