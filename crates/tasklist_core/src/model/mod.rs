//! Domain model for the task list.
//!
//! # Responsibility
//! - Define the task item value type shared by store, sync and FFI layers.
//! - Define the remote document wire shape and its mapping to task items.
//!
//! # Invariants
//! - Every task item held by the store has a non-blank title.
//! - Tags use set semantics; the remote list form is only a wire detail.

pub mod document;
pub mod task;
