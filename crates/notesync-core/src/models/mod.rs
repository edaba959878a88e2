//! Data models for notesync

mod note;
mod offline;
mod status;

pub use note::{Note, NoteEntry, NoteId, TEMPORARY_ID_PREFIX};
pub use offline::OfflineRecord;
pub use status::{OfflineStatus, SyncStatus};
