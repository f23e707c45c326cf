//! Remote document collection contracts and backends.
//!
//! # Responsibility
//! - Define the blocking CRUD seam that sync workers dispatch to.
//! - Provide in-memory, SQLite and Firestore REST backends.
//! - Build the configured backend from `RemoteConfig`.
//!
//! # Invariants
//! - Backends assign document ids; callers never choose them.
//! - Backends are `Send + Sync` so one handle can serve concurrent workers.
//! - Errors are `Clone` so they can be reported on several channels.

pub mod firestore;
pub mod memory;
pub mod sqlite;

use crate::config::{RemoteBackend, RemoteConfig};
use crate::model::document::{StoredDocument, TodoDocument};
use crate::model::task::RemoteId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub use firestore::FirestoreCollection;
pub use memory::InMemoryCollection;
pub use sqlite::SqliteCollection;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure reported by a remote backend or by the sync dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport-level failure (network, IO, locked database).
    Unavailable(String),
    /// The backend answered but refused the request.
    Rejected { status: u16, message: String },
    /// Addressed document does not exist.
    NotFound(RemoteId),
    /// Backend returned data that cannot be decoded.
    InvalidData(String),
    /// The dispatched worker panicked or was cancelled.
    Aborted(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "remote unavailable: {message}"),
            Self::Rejected { status, message } => {
                write!(f, "remote rejected request ({status}): {message}")
            }
            Self::NotFound(id) => write!(f, "remote document not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid remote data: {message}"),
            Self::Aborted(message) => write!(f, "remote operation aborted: {message}"),
        }
    }
}

impl Error for RemoteError {}

impl RemoteError {
    /// Stable short code used in log lines and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "remote_unavailable",
            Self::Rejected { .. } => "remote_rejected",
            Self::NotFound(_) => "remote_not_found",
            Self::InvalidData(_) => "remote_invalid_data",
            Self::Aborted(_) => "remote_aborted",
        }
    }
}

/// Collection operation kinds, used for fault injection and failure records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    List,
    Create,
    Update,
    Delete,
}

/// Blocking CRUD interface over one remote document collection.
pub trait DocumentCollection: Send + Sync {
    /// Human-readable backend label for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Reads every document; order is backend-defined.
    fn list_documents(&self) -> RemoteResult<Vec<StoredDocument>>;

    /// Writes a new document and returns the assigned id.
    fn create_document(&self, document: &TodoDocument) -> RemoteResult<RemoteId>;

    /// Overwrites `title`, `done` and `tags` of an existing document.
    fn update_document(&self, id: &str, document: &TodoDocument) -> RemoteResult<()>;

    /// Removes a document.
    fn delete_document(&self, id: &str) -> RemoteResult<()>;
}

/// Builds the backend selected by configuration.
///
/// Returns `Ok(None)` when remote persistence is disabled.
pub fn open_collection(config: &RemoteConfig) -> RemoteResult<Option<Arc<dyn DocumentCollection>>> {
    let collection: Arc<dyn DocumentCollection> = match config.backend {
        RemoteBackend::None => return Ok(None),
        RemoteBackend::Memory => Arc::new(InMemoryCollection::new()),
        RemoteBackend::Sqlite => {
            let path = config.sqlite_path.as_ref().ok_or_else(|| {
                RemoteError::Unavailable("sqlite backend requires `sqlite_path`".to_string())
            })?;
            Arc::new(SqliteCollection::open(path, config.collection.as_str())?)
        }
        RemoteBackend::Firestore => {
            let firestore = config.firestore.as_ref().ok_or_else(|| {
                RemoteError::Unavailable(
                    "firestore backend requires a `[remote.firestore]` section".to_string(),
                )
            })?;
            Arc::new(FirestoreCollection::new(
                firestore,
                config.collection.as_str(),
            ))
        }
    };
    Ok(Some(collection))
}
