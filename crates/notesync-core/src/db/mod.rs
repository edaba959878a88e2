//! Durable offline store for notesync

mod connection;
mod migrations;
mod offline_store;

pub use connection::Database;
pub use offline_store::{MemoryOfflineStore, OfflineQueue, OfflineStore, SqliteOfflineStore};
