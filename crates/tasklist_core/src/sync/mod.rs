//! Asynchronous mirroring between the task store and a remote collection.
//!
//! # Responsibility
//! - Dispatch remote CRUD without blocking the caller.
//! - Report every completion both to the awaiting caller and on the event
//!   channel.
//!
//! # Invariants
//! - Sync workers never touch the task store.
//! - Failures are always logged at the dispatch boundary.

pub mod remote_sync;
