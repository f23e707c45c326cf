//! Remote document wire shape.
//!
//! # Responsibility
//! - Mirror the fields stored per document in the remote `todos` collection.
//! - Convert between documents and task items.
//!
//! # Invariants
//! - Missing fields decode to defaults (`""`, `false`, `[]`).
//! - `tags` is an ordered list on the wire; order carries no meaning.

use super::task::{RemoteId, TaskItem, TaskValidationError};
use serde::{Deserialize, Serialize};

/// Field set of one remote task document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Document paired with its store-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: RemoteId,
    pub document: TodoDocument,
}

impl TodoDocument {
    /// Captures the mutable fields of an item.
    pub fn from_item(item: &TaskItem) -> Self {
        Self {
            title: item.title.clone(),
            done: item.done,
            tags: item.tags.iter().cloned().collect(),
        }
    }

    /// Builds a hydrated item carrying `id` and a fresh local key.
    ///
    /// # Errors
    /// - Returns `BlankTitle` for documents whose title is missing or blank.
    pub fn into_item(self, id: impl Into<RemoteId>) -> Result<TaskItem, TaskValidationError> {
        TaskItem::from_remote(id, self.title, self.done, self.tags)
    }
}

impl From<&TaskItem> for TodoDocument {
    fn from(value: &TaskItem) -> Self {
        Self::from_item(value)
    }
}
