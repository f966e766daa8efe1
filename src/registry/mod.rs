//! In-memory concurrent job table.
//!
//! The registry is the single source of truth for live job status. It
//! is owned once at startup and shared behind an `Arc`; every mutation
//! from coordinator or strategy execution units goes through
//! [`JobRegistry::update`], which applies the closure under the write
//! lock so read-modify-write races on `progress`/`status` cannot lose
//! updates. Completed jobs stay in the table until the caller deletes
//! them; durable summaries live in [`crate::history`].

pub mod store;

pub use store::JobRegistry;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job already exists: {0}")]
    DuplicateId(String),

    #[error("job not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
