//! Core task list logic.
//! The store owns local state; remote collections only mirror it.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{
    BehaviorConfig, BlankTitlePolicy, ConfigError, ConfigResult, FirestoreConfig, LoggingConfig,
    RemoteBackend, RemoteConfig, RemoteFailurePolicy, TodoConfig,
};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LogLevel,
    LoggingError,
};
pub use model::document::{StoredDocument, TodoDocument};
pub use model::task::{
    RemoteId, TagSet, TaskItem, TaskKey, TaskValidationError, DEFAULT_TAG_LABELS,
};
pub use remote::{
    open_collection, DocumentCollection, FirestoreCollection, InMemoryCollection, RemoteError,
    RemoteOperation, RemoteResult, SqliteCollection,
};
pub use service::todo_service::{ServiceError, ServiceResult, SyncFailure, TodoService};
pub use store::task_store::{StoreError, StoreResult, StoreSnapshot, TaskStore};
pub use sync::remote_sync::{RemoteOp, RemoteSync, SyncEvent};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
