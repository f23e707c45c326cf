//! In-memory task list state.
//!
//! # Responsibility
//! - Own the ordered task collection shown by the view layer.
//! - Publish change notifications to subscribers.
//!
//! # Invariants
//! - Only the owning thread mutates the collection; remote completions are
//!   applied by the service layer, never by sync workers.

pub mod task_store;
