//! Remote note service: the server-side CRUD API the engine replays against.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use http::HttpNoteService;

use crate::error::Result;
use crate::models::NoteId;

/// A note as listed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNote {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    /// Server-side flag set by every client write
    pub synced: bool,
}

/// Server acknowledgement of a create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedNote {
    pub id: NoteId,
    pub updated_at: DateTime<Utc>,
}

/// Request body for create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    pub title: String,
    pub content: String,
    pub synced: bool,
}

impl NotePayload {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            synced: true,
        }
    }
}

/// Trait for the remote CRUD API
///
/// Any non-success response or transport error is reported as `Err`.
#[async_trait]
pub trait RemoteNoteService: Send + Sync {
    async fn list(&self) -> Result<Vec<RemoteNote>>;

    async fn create(&self, payload: &NotePayload) -> Result<CreatedNote>;

    /// Returns the server's new `updatedAt`
    async fn update(&self, id: &NoteId, payload: &NotePayload) -> Result<DateTime<Utc>>;

    async fn delete(&self, id: &NoteId) -> Result<()>;

    /// Cheap reachability check used by the connectivity probe
    async fn ping(&self) -> Result<()> {
        self.list().await.map(|_| ())
    }
}

#[async_trait]
impl<T: RemoteNoteService + ?Sized> RemoteNoteService for Arc<T> {
    async fn list(&self) -> Result<Vec<RemoteNote>> {
        (**self).list().await
    }

    async fn create(&self, payload: &NotePayload) -> Result<CreatedNote> {
        (**self).create(payload).await
    }

    async fn update(&self, id: &NoteId, payload: &NotePayload) -> Result<DateTime<Utc>> {
        (**self).update(id, payload).await
    }

    async fn delete(&self, id: &NoteId) -> Result<()> {
        (**self).delete(id).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}
