//! Task item domain model.
//!
//! # Responsibility
//! - Define the canonical to-do entry and its identities.
//! - Reject blank titles at construction time.
//!
//! # Invariants
//! - `key` is generated locally and never reused for another item.
//! - `id` stays `None` until the remote store assigns one.
//! - `title` is non-blank; it is stored exactly as given.
//! - `tags` hold arbitrary strings; only exact duplicates collapse.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Local placeholder identity used to address items inside the store.
pub type TaskKey = Uuid;

/// Identifier assigned by the remote document collection.
pub type RemoteId = String;

/// Unordered, deduplicated tag labels.
///
/// `BTreeSet` keeps iteration deterministic for display and serialization.
pub type TagSet = BTreeSet<String>;

/// Label vocabulary offered by the tag picker.
pub const DEFAULT_TAG_LABELS: [&str; 3] = ["School", "Personal", "House"];

/// Validation failures for task item construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    BlankTitle,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "task title cannot be blank"),
        }
    }
}

impl Error for TaskValidationError {}

/// One to-do entry.
///
/// Items are treated as values: mutations produce a replacement rather than
/// editing shared state in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Local identity, stable for the lifetime of the in-memory item.
    pub key: TaskKey,
    /// Remote document id, absent until the first successful create.
    pub id: Option<RemoteId>,
    pub title: String,
    pub done: bool,
    pub tags: TagSet,
}

impl TaskItem {
    /// Creates a not-yet-persisted item with a fresh local key.
    ///
    /// # Errors
    /// - Returns `BlankTitle` when `title` is empty or whitespace only.
    pub fn new<I, S>(title: impl Into<String>, tags: I) -> Result<Self, TaskValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let title = title.into();
        if is_blank_title(&title) {
            return Err(TaskValidationError::BlankTitle);
        }
        Ok(Self {
            key: Uuid::new_v4(),
            id: None,
            title,
            done: false,
            tags: tag_set(tags),
        })
    }

    /// Creates an item that already exists remotely.
    ///
    /// Used by hydration, where the document id is known up front.
    pub fn from_remote<I, S>(
        id: impl Into<RemoteId>,
        title: impl Into<String>,
        done: bool,
        tags: I,
    ) -> Result<Self, TaskValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut item = Self::new(title, tags)?;
        item.id = Some(id.into());
        item.done = done;
        Ok(item)
    }

    /// Returns a copy with `done` replaced and every other field unchanged.
    pub fn with_done(&self, done: bool) -> Self {
        Self {
            done,
            ..self.clone()
        }
    }

    /// Returns a copy carrying the given remote id.
    pub fn with_remote_id(&self, id: impl Into<RemoteId>) -> Self {
        Self {
            id: Some(id.into()),
            ..self.clone()
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Re-checks invariants on values that did not go through a constructor.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::BlankTitle);
        }
        Ok(())
    }
}

/// Returns `true` when a title would be rejected at the boundary.
pub fn is_blank_title(title: &str) -> bool {
    title.trim().is_empty()
}

/// Collects tag labels into a set; strings are kept verbatim.
pub fn tag_set<I, S>(tags: I) -> TagSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}
