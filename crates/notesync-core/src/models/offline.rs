//! Offline record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Note, NoteId, OfflineStatus};

/// A note queued in the durable offline store, tagged with the remote
/// operation still owed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineRecord {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub status: OfflineStatus,
}

impl OfflineRecord {
    pub fn new(id: NoteId, note: &Note, status: OfflineStatus) -> Self {
        Self {
            id,
            title: note.title.clone(),
            content: note.content.clone(),
            updated_at: note.updated_at,
            status,
        }
    }

    /// The queued note payload, with its id
    pub fn note(&self) -> Note {
        Note {
            id: Some(self.id.clone()),
            title: self.title.clone(),
            content: self.content.clone(),
            updated_at: self.updated_at,
        }
    }
}
