//! notesync-core - Core library for notesync
//!
//! This crate contains the offline-first synchronization engine shared by
//! every notesync client: note models, the in-memory note repository, the
//! durable offline queue, the remote note service client, connectivity
//! tracking, and the reconciliation sweep that replays queued edits.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod repository;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use models::{Note, NoteEntry, NoteId, OfflineRecord, OfflineStatus, SyncStatus};
pub use sync::{DeleteOutcome, SaveOutcome, SyncEngine, SyncEvent, SyncReport};
