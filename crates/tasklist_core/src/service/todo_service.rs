//! Task list session service.
//!
//! # Responsibility
//! - Expose the mutation entry points the view layer calls.
//! - Mirror every local mutation to the remote collection, best effort.
//! - Fold remote completions back into the store on the owning thread.
//!
//! # Invariants
//! - Local mutations apply immediately; remote calls never block them.
//! - Remote failures never roll back local state.
//! - A document created for an item removed while the create was in flight
//!   is deleted once its id is known.
//! - An item toggled while its create was in flight gets a follow-up update
//!   once its id is known.
//! - Writes to one document are sent one at a time, in mutation order.

use crate::config::{BehaviorConfig, BlankTitlePolicy, RemoteFailurePolicy, TodoConfig};
use crate::model::task::{is_blank_title, RemoteId, TaskItem, TaskKey};
use crate::remote::{open_collection, DocumentCollection, RemoteError, RemoteOperation};
use crate::store::task_store::{StoreError, StoreSnapshot, TaskStore};
use crate::sync::remote_sync::{RemoteSync, SyncEvent};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    BlankTitle,
    Store(StoreError),
    Remote(RemoteError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "task title cannot be blank"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BlankTitle => None,
            Self::Store(err) => Some(err),
            Self::Remote(err) => Some(err),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<RemoteError> for ServiceError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

/// Remote failure kept for callers under `RemoteFailurePolicy::Surface`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub operation: RemoteOperation,
    pub key: Option<TaskKey>,
    pub id: Option<RemoteId>,
    pub error: RemoteError,
}

/// Write waiting for an earlier write to the same document.
enum QueuedWrite {
    Update(TaskItem),
    Delete,
}

struct RemoteLink {
    sync: RemoteSync,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    in_flight: usize,
    pending_creates: HashSet<TaskKey>,
    changed_while_pending: HashSet<TaskKey>,
    /// Documents with a write in flight, and the writes queued behind it.
    writing: HashMap<RemoteId, VecDeque<QueuedWrite>>,
}

impl RemoteLink {
    fn new(sync: RemoteSync, events: mpsc::UnboundedReceiver<SyncEvent>) -> Self {
        Self {
            sync,
            events,
            in_flight: 0,
            pending_creates: HashSet::new(),
            changed_while_pending: HashSet::new(),
            writing: HashMap::new(),
        }
    }

    fn create(&mut self, item: &TaskItem) {
        self.sync.create(item).detach();
        self.in_flight += 1;
        self.pending_creates.insert(item.key);
    }

    fn update(&mut self, id: &str, item: &TaskItem) {
        self.enqueue(id, QueuedWrite::Update(item.clone()));
    }

    fn delete(&mut self, id: &str) {
        self.enqueue(id, QueuedWrite::Delete);
    }

    /// Sends `write` now, or queues it behind the write already in flight
    /// for `id` so one document sees writes in mutation order.
    fn enqueue(&mut self, id: &str, write: QueuedWrite) {
        let Some(queue) = self.writing.get_mut(id) else {
            self.writing.insert(id.to_string(), VecDeque::new());
            self.dispatch(id, write);
            return;
        };
        // An unsent update is superseded by a newer one.
        if matches!(write, QueuedWrite::Update(_))
            && matches!(queue.back(), Some(QueuedWrite::Update(_)))
        {
            queue.pop_back();
        }
        queue.push_back(write);
        debug!(
            "event=remote_write module=service status=queued id={id} depth={}",
            queue.len()
        );
    }

    fn dispatch(&mut self, id: &str, write: QueuedWrite) {
        match write {
            QueuedWrite::Update(item) => self.sync.update(id, &item).detach(),
            QueuedWrite::Delete => self.sync.delete(id).detach(),
        }
        self.in_flight += 1;
    }

    /// Releases `id` after a write completed, sending the next queued one.
    fn write_finished(&mut self, id: &str) {
        let next = match self.writing.get_mut(id) {
            Some(queue) => queue.pop_front(),
            None => return,
        };
        match next {
            Some(write) => self.dispatch(id, write),
            None => {
                self.writing.remove(id);
            }
        }
    }

    /// Mirrors a local state change of `item`.
    fn mirror_change(&mut self, item: &TaskItem) {
        match item.id.as_deref() {
            Some(id) => self.update(id, item),
            None if self.pending_creates.contains(&item.key) => {
                self.changed_while_pending.insert(item.key);
            }
            None => debug!(
                "event=remote_update module=service status=skipped key={} reason=not_persisted",
                item.key
            ),
        }
    }

    /// Mirrors removal of `item`; pending creates are settled on completion.
    fn mirror_removal(&mut self, item: &TaskItem) {
        self.changed_while_pending.remove(&item.key);
        match item.id.as_deref() {
            Some(id) => self.delete(id),
            None if self.pending_creates.contains(&item.key) => debug!(
                "event=remote_delete module=service status=deferred key={} reason=create_in_flight",
                item.key
            ),
            None => debug!(
                "event=remote_delete module=service status=skipped key={} reason=not_persisted",
                item.key
            ),
        }
    }
}

/// One task list session: the store plus optional remote mirroring.
pub struct TodoService {
    store: TaskStore,
    remote: Option<RemoteLink>,
    behavior: BehaviorConfig,
    failures: Vec<SyncFailure>,
    /// Store revision right after the last successful hydrate.
    synced_revision: u64,
}

impl TodoService {
    /// Creates a session that keeps tasks in memory only.
    pub fn local(behavior: BehaviorConfig) -> Self {
        Self {
            store: TaskStore::new(),
            remote: None,
            behavior,
            failures: Vec::new(),
            synced_revision: 0,
        }
    }

    /// Creates a session mirrored to `collection`, dispatching on `runtime`.
    pub fn with_remote(
        behavior: BehaviorConfig,
        collection: Arc<dyn DocumentCollection>,
        runtime: Handle,
    ) -> Self {
        let (sync, events) = RemoteSync::with_events(collection, runtime);
        info!(
            "event=service_init module=service status=ok backend={}",
            sync.backend_name()
        );
        Self {
            remote: Some(RemoteLink::new(sync, events)),
            ..Self::local(behavior)
        }
    }

    /// Builds a session from configuration, opening the configured backend.
    pub fn from_config(config: &TodoConfig, runtime: Handle) -> ServiceResult<Self> {
        let service = match open_collection(&config.remote)? {
            Some(collection) => Self::with_remote(config.behavior.clone(), collection, runtime),
            None => Self::local(config.behavior.clone()),
        };
        Ok(service)
    }

    /// Adds a task and dispatches its remote creation.
    ///
    /// # Contract
    /// - Blank titles follow `BlankTitlePolicy`: `Ignore` yields `Ok(None)`,
    ///   `Reject` yields `Err(BlankTitle)`. The store is unchanged either way.
    /// - Tags are dropped when the tags capability is disabled.
    pub fn add<I, S>(&mut self, title: &str, tags: I) -> ServiceResult<Option<TaskItem>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if is_blank_title(title) {
            return match self.behavior.blank_title {
                BlankTitlePolicy::Ignore => Ok(None),
                BlankTitlePolicy::Reject => Err(ServiceError::BlankTitle),
            };
        }

        let tags: Vec<String> = if self.behavior.tags_enabled {
            tags.into_iter().map(Into::into).collect()
        } else {
            Vec::new()
        };

        let Some(item) = self.store.add(title, tags) else {
            return Ok(None);
        };
        if let Some(link) = self.remote.as_mut() {
            link.create(&item);
        }
        Ok(Some(item))
    }

    /// Sets the completion flag of one task in place.
    pub fn toggle_done(&mut self, key: TaskKey, value: bool) -> ServiceResult<TaskItem> {
        let item = self.store.toggle_done(key, value)?;
        if let Some(link) = self.remote.as_mut() {
            link.mirror_change(&item);
        }
        Ok(item)
    }

    /// Removes one task.
    pub fn remove(&mut self, key: TaskKey) -> ServiceResult<TaskItem> {
        let item = self.store.remove(key)?;
        if let Some(link) = self.remote.as_mut() {
            link.mirror_removal(&item);
        }
        Ok(item)
    }

    /// Removes every completed task and cascades remote deletions.
    pub fn clear_completed(&mut self) -> Vec<TaskItem> {
        let removed = self.store.clear_completed();
        self.mirror_removals(&removed);
        removed
    }

    /// Removes every task and cascades remote deletions.
    pub fn clear_all(&mut self) -> Vec<TaskItem> {
        let removed = self.store.clear_all();
        self.mirror_removals(&removed);
        removed
    }

    /// Replaces local content with the remote collection.
    ///
    /// In-flight operations are awaited first so the snapshot includes them.
    /// Without a remote backend this is a no-op returning the current size.
    ///
    /// # Errors
    /// - Returns `Remote` on fetch failure under `RemoteFailurePolicy::Surface`;
    ///   under `LogAndIgnore` the store is left unchanged and its size returned.
    pub async fn hydrate(&mut self) -> ServiceResult<usize> {
        self.settle().await;

        let Some(link) = self.remote.as_ref() else {
            return Ok(self.store.len());
        };
        if self.has_local_changes() {
            warn!(
                "event=hydrate module=service status=overwrite discarded={} revision={}",
                self.store.len(),
                self.store.revision()
            );
        }

        match link.sync.fetch_all().await {
            Ok(items) => {
                let kept = self.store.replace_all(items);
                self.synced_revision = self.store.revision();
                info!("event=hydrate module=service status=ok count={kept}");
                Ok(kept)
            }
            Err(err) => {
                self.record_failure(SyncFailure {
                    operation: RemoteOperation::List,
                    key: None,
                    id: None,
                    error: err.clone(),
                });
                match self.behavior.remote_failure {
                    RemoteFailurePolicy::LogAndIgnore => Ok(self.store.len()),
                    RemoteFailurePolicy::Surface => Err(ServiceError::Remote(err)),
                }
            }
        }
    }

    /// True when the store was mutated since the last successful hydrate.
    pub fn has_local_changes(&self) -> bool {
        self.store.revision() != self.synced_revision
    }

    /// Applies every completion already delivered, without waiting.
    ///
    /// Returns the number of events applied.
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(link) = self.remote.as_mut() else {
                return applied;
            };
            let Ok(event) = link.events.try_recv() else {
                return applied;
            };
            self.apply_event(event);
            applied += 1;
        }
    }

    /// Waits until every dispatched remote operation has completed and
    /// been applied, including follow-ups dispatched while settling.
    pub async fn settle(&mut self) {
        loop {
            let Some(link) = self.remote.as_mut() else {
                return;
            };
            if link.in_flight == 0 {
                return;
            }
            let Some(event) = link.events.recv().await else {
                return;
            };
            self.apply_event(event);
        }
    }

    /// Folds one remote completion into local state.
    fn apply_event(&mut self, event: SyncEvent) {
        let Some(link) = self.remote.as_mut() else {
            return;
        };
        link.in_flight = link.in_flight.saturating_sub(1);

        let failure = match event {
            SyncEvent::Created { key, result: Ok(id) } => {
                link.pending_creates.remove(&key);
                let changed = link.changed_while_pending.remove(&key);

                if self.store.get(key).is_none() {
                    info!(
                        "event=remote_reconcile module=service status=orphan_delete key={key} id={id}"
                    );
                    link.delete(&id);
                    return;
                }

                match self.store.assign_remote_id(key, id.clone()) {
                    Ok(item) => {
                        if changed {
                            link.update(&id, &item);
                        }
                        None
                    }
                    Err(err) => {
                        warn!(
                            "event=remote_reconcile module=service status=error key={key} id={id} error={err}"
                        );
                        None
                    }
                }
            }
            SyncEvent::Created {
                key,
                result: Err(error),
            } => {
                link.pending_creates.remove(&key);
                link.changed_while_pending.remove(&key);
                Some(SyncFailure {
                    operation: RemoteOperation::Create,
                    key: Some(key),
                    id: None,
                    error,
                })
            }
            SyncEvent::Updated { key, id, result } => {
                link.write_finished(&id);
                result.err().map(|error| SyncFailure {
                    operation: RemoteOperation::Update,
                    key: Some(key),
                    id: Some(id),
                    error,
                })
            }
            SyncEvent::Deleted { id, result } => {
                link.write_finished(&id);
                result.err().map(|error| SyncFailure {
                    operation: RemoteOperation::Delete,
                    key: None,
                    id: Some(id),
                    error,
                })
            }
        };

        if let Some(failure) = failure {
            self.record_failure(failure);
        }
    }

    /// Drains failures collected under `RemoteFailurePolicy::Surface`.
    pub fn take_failures(&mut self) -> Vec<SyncFailure> {
        std::mem::take(&mut self.failures)
    }

    pub fn items(&self) -> &[TaskItem] {
        self.store.items()
    }

    pub fn get(&self, key: TaskKey) -> Option<&TaskItem> {
        self.store.get(key)
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.store.subscribe()
    }

    /// Labels offered by the tag picker; empty when tags are disabled.
    pub fn tag_labels(&self) -> &[String] {
        if self.behavior.tags_enabled {
            &self.behavior.tag_labels
        } else {
            &[]
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.remote.as_ref().map(|link| link.sync.backend_name())
    }

    /// Remote operations dispatched but not yet applied.
    pub fn in_flight(&self) -> usize {
        self.remote.as_ref().map_or(0, |link| link.in_flight)
    }

    fn mirror_removals(&mut self, removed: &[TaskItem]) {
        if let Some(link) = self.remote.as_mut() {
            for item in removed {
                link.mirror_removal(item);
            }
        }
    }

    fn record_failure(&mut self, failure: SyncFailure) {
        if self.behavior.remote_failure == RemoteFailurePolicy::Surface {
            self.failures.push(failure);
        }
    }
}
