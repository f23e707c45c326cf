//! Result-returning remote dispatcher.
//!
//! # Responsibility
//! - Run blocking collection calls on the tokio blocking pool.
//! - Hand back a `RemoteOp` future per call; dropping it detaches the work.
//! - Publish a `SyncEvent` for create/update/delete completions.
//!
//! # Invariants
//! - Dispatch returns immediately; no call here waits on the network.
//! - Completion order across operations is not guaranteed.
//! - A panicking backend call still yields a result and an event.
//! - Log lines carry keys, ids and error codes only.

use crate::model::document::TodoDocument;
use crate::model::task::{RemoteId, TaskItem, TaskKey};
use crate::remote::{DocumentCollection, RemoteError, RemoteResult};
use log::{debug, warn};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Completion notice for a mirrored mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Created {
        key: TaskKey,
        result: RemoteResult<RemoteId>,
    },
    Updated {
        key: TaskKey,
        id: RemoteId,
        result: RemoteResult<()>,
    },
    Deleted {
        id: RemoteId,
        result: RemoteResult<()>,
    },
}

impl SyncEvent {
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Created { result, .. } => result.is_err(),
            Self::Updated { result, .. } | Self::Deleted { result, .. } => result.is_err(),
        }
    }
}

/// Handle to one dispatched remote operation.
///
/// Await it to observe the outcome, or drop it to let the call finish in
/// the background.
#[must_use = "await the RemoteOp, or call `detach` to ignore its outcome"]
pub struct RemoteOp<T> {
    handle: JoinHandle<RemoteResult<T>>,
}

impl<T> RemoteOp<T> {
    /// Lets the operation run to completion without observing it.
    pub fn detach(self) {}
}

impl<T> Future for RemoteOp<T> {
    type Output = RemoteResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join_error)) => {
                Poll::Ready(Err(RemoteError::Aborted(join_error.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Mirrors task mutations to a remote document collection.
#[derive(Clone)]
pub struct RemoteSync {
    collection: Arc<dyn DocumentCollection>,
    runtime: Handle,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl RemoteSync {
    /// Creates a dispatcher without an event channel.
    pub fn new(collection: Arc<dyn DocumentCollection>, runtime: Handle) -> Self {
        Self {
            collection,
            runtime,
            events: None,
        }
    }

    /// Creates a dispatcher that also reports completions on a channel.
    pub fn with_events(
        collection: Arc<dyn DocumentCollection>,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let sync = Self {
            collection,
            runtime,
            events: Some(sender),
        };
        (sync, receiver)
    }

    pub fn backend_name(&self) -> &'static str {
        self.collection.backend_name()
    }

    /// Reads every remote document as a task item.
    ///
    /// Documents that cannot form a valid item (blank title) are skipped.
    /// Order follows the backend and must not be relied on.
    pub fn fetch_all(&self) -> RemoteOp<Vec<TaskItem>> {
        let collection = Arc::clone(&self.collection);
        let handle = self.runtime.spawn_blocking(move || -> RemoteResult<Vec<TaskItem>> {
            let started_at = Instant::now();
            let documents = guarded(|| collection.list_documents()).map_err(|err| {
                warn!(
                    "event=remote_fetch module=sync status=error backend={} duration_ms={} error_code={} error={}",
                    collection.backend_name(),
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                err
            })?;

            let total = documents.len();
            let items: Vec<TaskItem> = documents
                .into_iter()
                .filter_map(|stored| stored.document.into_item(stored.id).ok())
                .collect();
            if items.len() < total {
                warn!(
                    "event=remote_fetch module=sync status=partial skipped={} reason=blank_title",
                    total - items.len()
                );
            }
            debug!(
                "event=remote_fetch module=sync status=ok backend={} count={} duration_ms={}",
                collection.backend_name(),
                items.len(),
                started_at.elapsed().as_millis()
            );
            Ok(items)
        });
        RemoteOp { handle }
    }

    /// Writes a new document for `item` and yields the assigned id.
    pub fn create(&self, item: &TaskItem) -> RemoteOp<RemoteId> {
        let collection = Arc::clone(&self.collection);
        let events = self.events.clone();
        let key = item.key;
        let document = TodoDocument::from_item(item);

        let handle = self.runtime.spawn_blocking(move || {
            let result = guarded(|| collection.create_document(&document));
            match &result {
                Ok(id) => debug!("event=remote_create module=sync status=ok key={key} id={id}"),
                Err(err) => warn!(
                    "event=remote_create module=sync status=error key={key} error_code={} error={}",
                    err.code(),
                    err
                ),
            }
            emit(
                events.as_ref(),
                SyncEvent::Created {
                    key,
                    result: result.clone(),
                },
            );
            result
        });
        RemoteOp { handle }
    }

    /// Overwrites `title`, `done` and `tags` of document `id`.
    pub fn update(&self, id: &str, item: &TaskItem) -> RemoteOp<()> {
        let collection = Arc::clone(&self.collection);
        let events = self.events.clone();
        let key = item.key;
        let id = id.to_string();
        let document = TodoDocument::from_item(item);

        let handle = self.runtime.spawn_blocking(move || {
            let result = guarded(|| collection.update_document(&id, &document));
            match &result {
                Ok(()) => debug!("event=remote_update module=sync status=ok key={key} id={id}"),
                Err(err) => warn!(
                    "event=remote_update module=sync status=error key={key} id={id} error_code={} error={}",
                    err.code(),
                    err
                ),
            }
            emit(
                events.as_ref(),
                SyncEvent::Updated {
                    key,
                    id,
                    result: result.clone(),
                },
            );
            result
        });
        RemoteOp { handle }
    }

    /// Removes document `id`.
    pub fn delete(&self, id: &str) -> RemoteOp<()> {
        let collection = Arc::clone(&self.collection);
        let events = self.events.clone();
        let id = id.to_string();

        let handle = self.runtime.spawn_blocking(move || {
            let result = guarded(|| collection.delete_document(&id));
            match &result {
                Ok(()) => debug!("event=remote_delete module=sync status=ok id={id}"),
                Err(err) => warn!(
                    "event=remote_delete module=sync status=error id={id} error_code={} error={}",
                    err.code(),
                    err
                ),
            }
            emit(
                events.as_ref(),
                SyncEvent::Deleted {
                    id,
                    result: result.clone(),
                },
            );
            result
        });
        RemoteOp { handle }
    }
}

/// Runs one backend call, turning a panic into `Aborted`.
fn guarded<T>(call: impl FnOnce() -> RemoteResult<T>) -> RemoteResult<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "backend call panicked".to_string());
        Err(RemoteError::Aborted(message))
    })
}

fn emit(events: Option<&mpsc::UnboundedSender<SyncEvent>>, event: SyncEvent) {
    if let Some(sender) = events {
        // Receiver gone means the session was dropped; nothing left to notify.
        let _ = sender.send(event);
    }
}
