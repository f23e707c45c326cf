//! Presentation-facing use-case services.
//!
//! # Responsibility
//! - Combine the task store with optional remote mirroring.
//! - Keep UI/FFI layers decoupled from sync and storage details.

pub mod todo_service;
