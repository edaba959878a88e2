//! Note model

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SyncStatus;
use crate::error::{Error, Result};

/// Prefix carried by every client-minted identifier.
pub const TEMPORARY_ID_PREFIX: &str = "offline-";

static LAST_TEMPORARY_MILLIS: AtomicI64 = AtomicI64::new(0);

/// A note identifier.
///
/// Either a temporary id (`offline-<ms>`) minted on this client before the
/// server has seen the note, or a permanent id assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Mint a new temporary id.
    ///
    /// The numeric part is a millisecond timestamp that is strictly
    /// increasing within the process, so two notes created in the same
    /// millisecond still get distinct ids.
    pub fn temporary() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut last = LAST_TEMPORARY_MILLIS.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_TEMPORARY_MILLIS.compare_exchange_weak(
                last,
                next,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(format!("{TEMPORARY_ID_PREFIX}{next}")),
                Err(actual) => last = actual,
            }
        }
    }

    /// Wrap an identifier assigned by the remote note service.
    pub fn server(id: impl Into<String>) -> Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(Error::InvalidInput("server note id cannot be empty".into()));
        }
        if id.starts_with(TEMPORARY_ID_PREFIX) {
            return Err(Error::InvalidInput(format!(
                "server note id '{id}' uses the reserved '{TEMPORARY_ID_PREFIX}' prefix"
            )));
        }
        Ok(Self(id))
    }

    /// Whether this id was minted locally and never acknowledged by the server.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("note id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A note as edited by the user and exchanged with the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Identifier, absent for a note that has never been saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NoteId>,
    pub title: String,
    pub content: String,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create an unsaved note with the given title and content
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            updated_at: Utc::now(),
        }
    }

    /// Attach an identifier
    #[must_use]
    pub fn with_id(mut self, id: NoteId) -> Self {
        self.id = Some(id);
        self
    }

    /// Check if both title and content are blank
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }

    /// Case-insensitive match against title or content.
    ///
    /// A blank term matches everything.
    pub fn matches(&self, term: &str) -> bool {
        matches_text(&self.title, &self.content, term)
    }
}

fn matches_text(title: &str, content: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    term.is_empty() || title.to_lowercase().contains(&term) || content.to_lowercase().contains(&term)
}

/// A note as held by the in-memory repository, annotated with its sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEntry {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

impl NoteEntry {
    /// Build an entry from a note whose id has already been resolved
    pub fn from_note(id: NoteId, note: &Note, sync_status: SyncStatus) -> Self {
        Self {
            id,
            title: note.title.clone(),
            content: note.content.clone(),
            updated_at: note.updated_at,
            sync_status,
        }
    }

    /// Convert back into a plain note
    pub fn to_note(&self) -> Note {
        Note {
            id: Some(self.id.clone()),
            title: self.title.clone(),
            content: self.content.clone(),
            updated_at: self.updated_at,
        }
    }

    pub fn matches(&self, term: &str) -> bool {
        matches_text(&self.title, &self.content, term)
    }

    /// A temporary id is never `Synced`.
    pub fn is_consistent(&self) -> bool {
        !(self.id.is_temporary() && self.sync_status == SyncStatus::Synced)
    }
}
