//! Ordered task collection and its mutation operations.
//!
//! # Responsibility
//! - Enforce task invariants on every insert.
//! - Keep insertion order stable across toggles and removals.
//! - Notify subscribers after each effective mutation.
//!
//! # Invariants
//! - Operations on a missing key return `NotFound` and change nothing.
//! - Remote ids are unique among items that have one.
//! - The revision counter increases only when the collection changes.

use crate::model::task::{RemoteId, TaskItem, TaskKey};
use log::{debug, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::watch;

pub type StoreResult<T> = Result<T, StoreError>;

/// Local task store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(TaskKey),
    DuplicateRemoteId(RemoteId),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "task not found: {key}"),
            Self::DuplicateRemoteId(id) => {
                write!(f, "remote id already assigned to another task: {id}")
            }
        }
    }
}

impl Error for StoreError {}

/// Immutable view of the collection published to subscribers.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub revision: u64,
    pub items: Arc<[TaskItem]>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            revision: 0,
            items: Arc::from(Vec::new()),
        }
    }
}

/// Single source of truth for the visible task list.
pub struct TaskStore {
    items: Vec<TaskItem>,
    revision: u64,
    notifier: watch::Sender<StoreSnapshot>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(StoreSnapshot::default());
        Self {
            items: Vec::new(),
            revision: 0,
            notifier,
        }
    }

    /// Appends a new item built from `title` and `tags`.
    ///
    /// Returns `None` and leaves the collection untouched when the title is
    /// blank after trimming.
    pub fn add<I, S>(&mut self, title: &str, tags: I) -> Option<TaskItem>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let item = match TaskItem::new(title, tags) {
            Ok(item) => item,
            Err(_) => {
                debug!("event=task_add module=store status=skipped reason=blank_title");
                return None;
            }
        };

        self.items.push(item.clone());
        debug!(
            "event=task_add module=store status=ok key={} tags={}",
            item.key,
            item.tags.len()
        );
        self.publish();
        Some(item)
    }

    /// Replaces the item at its current position with `done = value`.
    pub fn toggle_done(&mut self, key: TaskKey, value: bool) -> StoreResult<TaskItem> {
        let index = self.position(key)?;
        let updated = self.items[index].with_done(value);
        self.items[index] = updated.clone();
        debug!("event=task_toggle module=store status=ok key={key} done={value}");
        self.publish();
        Ok(updated)
    }

    /// Deletes one item and returns it.
    pub fn remove(&mut self, key: TaskKey) -> StoreResult<TaskItem> {
        let index = self.position(key)?;
        let removed = self.items.remove(index);
        debug!("event=task_remove module=store status=ok key={key}");
        self.publish();
        Ok(removed)
    }

    /// Removes every completed item, keeping the relative order of the rest.
    ///
    /// Removed items are returned in their original order so callers can
    /// cascade remote deletions.
    pub fn clear_completed(&mut self) -> Vec<TaskItem> {
        let (removed, kept): (Vec<TaskItem>, Vec<TaskItem>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| item.done);
        self.items = kept;

        if !removed.is_empty() {
            debug!(
                "event=task_clear_completed module=store status=ok removed={} remaining={}",
                removed.len(),
                self.items.len()
            );
            self.publish();
        }
        removed
    }

    /// Empties the collection unconditionally.
    pub fn clear_all(&mut self) -> Vec<TaskItem> {
        let removed = std::mem::take(&mut self.items);
        if !removed.is_empty() {
            debug!(
                "event=task_clear_all module=store status=ok removed={}",
                removed.len()
            );
            self.publish();
        }
        removed
    }

    /// Discards current content and loads a remote snapshot.
    ///
    /// Items violating store invariants (blank title, repeated remote id)
    /// are dropped. Returns the number of items kept.
    pub fn replace_all(&mut self, items: Vec<TaskItem>) -> usize {
        let mut seen_ids: HashSet<RemoteId> = HashSet::new();
        let mut kept = Vec::with_capacity(items.len());
        let mut dropped = 0usize;

        for item in items {
            if item.validate().is_err() {
                dropped += 1;
                continue;
            }
            if let Some(id) = item.id.as_ref() {
                if !seen_ids.insert(id.clone()) {
                    dropped += 1;
                    continue;
                }
            }
            kept.push(item);
        }

        if dropped > 0 {
            warn!(
                "event=task_replace_all module=store status=partial dropped={dropped} kept={}",
                kept.len()
            );
        }

        self.items = kept;
        self.publish();
        self.items.len()
    }

    /// Records the remote id assigned after a successful create.
    pub fn assign_remote_id(&mut self, key: TaskKey, id: RemoteId) -> StoreResult<TaskItem> {
        let index = self.position(key)?;
        if self
            .items
            .iter()
            .any(|item| item.key != key && item.id.as_deref() == Some(id.as_str()))
        {
            return Err(StoreError::DuplicateRemoteId(id));
        }

        let updated = self.items[index].with_remote_id(id);
        self.items[index] = updated.clone();
        self.publish();
        Ok(updated)
    }

    pub fn items(&self) -> &[TaskItem] {
        &self.items
    }

    pub fn get(&self, key: TaskKey) -> Option<&TaskItem> {
        self.items.iter().find(|item| item.key == key)
    }

    pub fn find_by_remote_id(&self, id: &str) -> Option<&TaskItem> {
        self.items
            .iter()
            .find(|item| item.id.as_deref() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a "clear completed" action would remove anything.
    pub fn has_completed(&self) -> bool {
        self.items.iter().any(|item| item.done)
    }

    /// Number of effective mutations applied so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the latest snapshot without subscribing.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.notifier.borrow().clone()
    }

    /// Subscribes to collection changes.
    ///
    /// The receiver starts with the current snapshot marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.notifier.subscribe()
    }

    fn position(&self, key: TaskKey) -> StoreResult<usize> {
        self.items
            .iter()
            .position(|item| item.key == key)
            .ok_or(StoreError::NotFound(key))
    }

    fn publish(&mut self) {
        self.revision += 1;
        // Why: send_replace keeps the latest snapshot even with no receivers.
        self.notifier.send_replace(StoreSnapshot {
            revision: self.revision,
            items: Arc::from(self.items.as_slice()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreError, TaskStore};
    use crate::model::task::TaskItem;
    use uuid::Uuid;

    fn store_with(titles: &[&str]) -> TaskStore {
        let mut store = TaskStore::new();
        for title in titles {
            store
                .add(title, Vec::<String>::new())
                .expect("title is not blank");
        }
        store
    }

    #[test]
    fn blank_add_leaves_store_unchanged() {
        let mut store = store_with(&["a"]);
        let revision = store.revision();
        assert!(store.add("   ", ["House"]).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn toggle_preserves_position_and_other_fields() {
        let mut store = store_with(&["a", "b", "c"]);
        let middle = store.items()[1].clone();

        let toggled = store
            .toggle_done(middle.key, true)
            .expect("middle item exists");
        assert!(toggled.done);
        assert_eq!(store.items()[1].key, middle.key);
        assert_eq!(store.items()[1].title, "b");
        assert_eq!(store.items()[1].tags, middle.tags);
        assert_eq!(store.items()[0].title, "a");
        assert_eq!(store.items()[2].title, "c");
    }

    #[test]
    fn toggle_missing_key_reports_not_found() {
        let mut store = store_with(&["a", "b"]);
        let before = store.items().to_vec();
        let missing = Uuid::new_v4();

        let err = store
            .toggle_done(missing, true)
            .expect_err("missing key should fail");
        assert_eq!(err, StoreError::NotFound(missing));
        assert_eq!(store.items(), before.as_slice());
    }

    #[test]
    fn remove_missing_key_reports_not_found() {
        let mut store = store_with(&["a"]);
        assert!(matches!(
            store.remove(Uuid::new_v4()),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_completed_keeps_remaining_order() {
        let mut store = store_with(&["a", "b", "c"]);
        let b = store.items()[1].key;
        store.toggle_done(b, true).expect("b exists");

        let removed = store.clear_completed();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].title, "b");
        let titles: Vec<_> = store.items().iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }

    #[test]
    fn clear_completed_without_done_items_does_not_publish() {
        let mut store = store_with(&["a"]);
        let revision = store.revision();
        assert!(store.clear_completed().is_empty());
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn clear_all_empties_store() {
        let mut store = store_with(&["a", "b"]);
        let removed = store.clear_all();
        assert_eq!(removed.len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn replace_all_drops_blank_titles_and_duplicate_ids() {
        let mut store = store_with(&["local"]);
        let good = TaskItem::from_remote("r1", "fetched", false, ["School"]).expect("valid");
        let duplicate = TaskItem::from_remote("r1", "again", true, Vec::<String>::new())
            .expect("valid");
        let mut blank = TaskItem::from_remote("r2", "x", false, Vec::<String>::new())
            .expect("valid");
        blank.title = "  ".to_string();

        let kept = store.replace_all(vec![good.clone(), duplicate, blank]);
        assert_eq!(kept, 1);
        assert_eq!(store.items(), &[good]);
    }

    #[test]
    fn assign_remote_id_rejects_collisions() {
        let mut store = store_with(&["a", "b"]);
        let a = store.items()[0].key;
        let b = store.items()[1].key;

        store
            .assign_remote_id(a, "doc-1".to_string())
            .expect("first assignment succeeds");
        let err = store
            .assign_remote_id(b, "doc-1".to_string())
            .expect_err("collision should fail");
        assert_eq!(err, StoreError::DuplicateRemoteId("doc-1".to_string()));
        assert_eq!(
            store.find_by_remote_id("doc-1").map(|item| item.key),
            Some(a)
        );
    }

    #[test]
    fn subscribers_observe_mutations() {
        let mut store = TaskStore::new();
        let mut receiver = store.subscribe();
        assert!(!receiver.has_changed().expect("sender alive"));

        store.add("a", Vec::<String>::new()).expect("valid title");
        assert!(receiver.has_changed().expect("sender alive"));
        let snapshot = receiver.borrow_and_update().clone();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.items.len(), 1);
    }
}
