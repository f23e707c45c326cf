//! In-process document collection.
//!
//! Used by tests and by sessions that want remote-shaped behavior without a
//! network. Supports fault injection per operation kind.

use super::{DocumentCollection, RemoteError, RemoteOperation, RemoteResult};
use crate::model::document::{StoredDocument, TodoDocument};
use crate::model::task::RemoteId;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    documents: Vec<StoredDocument>,
    failing: HashSet<RemoteOperation>,
    calls: Vec<RemoteOperation>,
}

/// Document collection kept in process memory, in creation order.
#[derive(Default)]
pub struct InMemoryCollection {
    state: Mutex<MemoryState>,
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the collection with pre-existing documents.
    pub fn with_documents(documents: Vec<StoredDocument>) -> Self {
        let collection = Self::new();
        collection.lock().documents = documents;
        collection
    }

    /// Makes every subsequent call of `operation` fail until cleared.
    pub fn fail(&self, operation: RemoteOperation) {
        self.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: RemoteOperation) {
        self.lock().failing.remove(&operation);
    }

    /// Returns a copy of the stored documents.
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.lock().documents.clone()
    }

    pub fn get(&self, id: &str) -> Option<TodoDocument> {
        self.lock()
            .documents
            .iter()
            .find(|stored| stored.id == id)
            .map(|stored| stored.document.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().documents.is_empty()
    }

    /// Operations received so far, in arrival order.
    pub fn calls(&self) -> Vec<RemoteOperation> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // Why: a poisoned lock only means a test worker panicked mid-call; the
        // document list itself is never left half-written.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, operation: RemoteOperation) -> RemoteResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        state.calls.push(operation);
        if state.failing.contains(&operation) {
            return Err(RemoteError::Unavailable(format!(
                "injected failure for {operation:?}"
            )));
        }
        Ok(state)
    }
}

impl DocumentCollection for InMemoryCollection {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn list_documents(&self) -> RemoteResult<Vec<StoredDocument>> {
        let state = self.begin(RemoteOperation::List)?;
        Ok(state.documents.clone())
    }

    fn create_document(&self, document: &TodoDocument) -> RemoteResult<RemoteId> {
        let mut state = self.begin(RemoteOperation::Create)?;
        let id = Uuid::new_v4().simple().to_string();
        state.documents.push(StoredDocument {
            id: id.clone(),
            document: document.clone(),
        });
        Ok(id)
    }

    fn update_document(&self, id: &str, document: &TodoDocument) -> RemoteResult<()> {
        let mut state = self.begin(RemoteOperation::Update)?;
        let stored = state
            .documents
            .iter_mut()
            .find(|stored| stored.id == id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        stored.document = document.clone();
        Ok(())
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.begin(RemoteOperation::Delete)?;
        let before = state.documents.len();
        state.documents.retain(|stored| stored.id != id);
        if state.documents.len() == before {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryCollection;
    use crate::model::document::TodoDocument;
    use crate::remote::{DocumentCollection, RemoteError, RemoteOperation};

    fn doc(title: &str) -> TodoDocument {
        TodoDocument {
            title: title.to_string(),
            ..TodoDocument::default()
        }
    }

    #[test]
    fn crud_cycle() {
        let collection = InMemoryCollection::new();
        let id = collection.create_document(&doc("a")).expect("create");
        assert_eq!(collection.len(), 1);

        let mut updated = doc("a");
        updated.done = true;
        collection.update_document(&id, &updated).expect("update");
        assert_eq!(collection.get(&id), Some(updated));

        collection.delete_document(&id).expect("delete");
        assert!(collection.is_empty());
    }

    #[test]
    fn missing_documents_report_not_found() {
        let collection = InMemoryCollection::new();
        assert_eq!(
            collection.delete_document("nope"),
            Err(RemoteError::NotFound("nope".to_string()))
        );
        assert!(matches!(
            collection.update_document("nope", &doc("x")),
            Err(RemoteError::NotFound(_))
        ));
    }

    #[test]
    fn injected_failures_apply_until_recovered() {
        let collection = InMemoryCollection::new();
        collection.fail(RemoteOperation::Create);
        assert!(matches!(
            collection.create_document(&doc("a")),
            Err(RemoteError::Unavailable(_))
        ));
        assert!(collection.is_empty());

        collection.recover(RemoteOperation::Create);
        collection.create_document(&doc("a")).expect("create after recover");
        assert_eq!(
            collection.calls(),
            vec![RemoteOperation::Create, RemoteOperation::Create]
        );
    }
}
