//! Offline queue: the write-ahead log of remote operations still owed.
//!
//! Keyed by note id, so there is at most one pending operation per note and
//! a later write replaces an earlier one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Note, NoteId, OfflineRecord, OfflineStatus};

/// Trait for durable offline storage
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Insert or replace the pending record for `id`
    async fn put(&self, id: &NoteId, note: &Note, status: OfflineStatus) -> Result<()>;

    /// Fetch the pending record for `id`, if any
    async fn get(&self, id: &NoteId) -> Result<Option<OfflineRecord>>;

    /// All pending records carrying `status`, oldest first
    async fn get_all_by_status(&self, status: OfflineStatus) -> Result<Vec<OfflineRecord>>;

    /// Remove the pending record for `id`; missing ids are not an error
    async fn delete_by_id(&self, id: &NoteId) -> Result<()>;

    /// Remove the queued write for `id` only if it still holds exactly `note`.
    ///
    /// Returns whether a record was removed. A newer write or a pending
    /// delete under the same id is left alone.
    async fn delete_if_unchanged(&self, id: &NoteId, note: &Note) -> Result<bool>;

    /// Number of pending records of each kind: (offline, deleted)
    async fn pending_counts(&self) -> Result<(usize, usize)> {
        let offline = self.get_all_by_status(OfflineStatus::Offline).await?.len();
        let deleted = self.get_all_by_status(OfflineStatus::Deleted).await?.len();
        Ok((offline, deleted))
    }
}

/// Synchronous queue operations over a borrowed connection
pub struct OfflineQueue<'a> {
    conn: &'a Connection,
}

impl<'a> OfflineQueue<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn put(&self, id: &NoteId, note: &Note, status: OfflineStatus) -> Result<()> {
        self.conn.execute(
            "INSERT INTO offline_notes (id, title, content, updated_at, status, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                updated_at = excluded.updated_at,
                status = excluded.status,
                queued_at = excluded.queued_at",
            params![
                id.as_str(),
                note.title,
                note.content,
                note.updated_at.timestamp_millis(),
                status.as_str(),
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &NoteId) -> Result<Option<OfflineRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, title, content, updated_at, status FROM offline_notes WHERE id = ?",
                params![id.as_str()],
                Self::parse_row,
            )
            .optional()?;
        record.map(RawRecord::into_record).transpose()
    }

    pub fn get_all_by_status(&self, status: OfflineStatus) -> Result<Vec<OfflineRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, content, updated_at, status
             FROM offline_notes
             WHERE status = ?
             ORDER BY queued_at ASC, id ASC",
        )?;

        let rows = stmt
            .query_map(params![status.as_str()], Self::parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawRecord::into_record).collect()
    }

    pub fn delete_by_id(&self, id: &NoteId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM offline_notes WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(())
    }

    pub fn delete_if_unchanged(&self, id: &NoteId, note: &Note) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM offline_notes
             WHERE id = ?1 AND status = ?2 AND updated_at = ?3 AND title = ?4 AND content = ?5",
            params![
                id.as_str(),
                OfflineStatus::Offline.as_str(),
                note.updated_at.timestamp_millis(),
                note.title,
                note.content,
            ],
        )?;
        Ok(removed > 0)
    }

    fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            updated_at: row.get(3)?,
            status: row.get(4)?,
        })
    }
}

struct RawRecord {
    id: String,
    title: String,
    content: String,
    updated_at: i64,
    status: String,
}

impl RawRecord {
    fn into_record(self) -> Result<OfflineRecord> {
        let updated_at = DateTime::from_timestamp_millis(self.updated_at).ok_or_else(|| {
            Error::Database(format!(
                "invalid updated_at {} for offline note {}",
                self.updated_at, self.id
            ))
        })?;
        Ok(OfflineRecord {
            id: self.id.parse()?,
            title: self.title,
            content: self.content,
            updated_at,
            status: self.status.parse()?,
        })
    }
}

/// `SQLite`-backed offline store shared across tasks
#[derive(Clone)]
pub struct SqliteOfflineStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteOfflineStore {
    /// Open the store at the given filesystem path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }
}

#[async_trait]
impl OfflineStore for SqliteOfflineStore {
    async fn put(&self, id: &NoteId, note: &Note, status: OfflineStatus) -> Result<()> {
        let db = self.db.lock().await;
        OfflineQueue::new(db.connection()).put(id, note, status)
    }

    async fn get(&self, id: &NoteId) -> Result<Option<OfflineRecord>> {
        let db = self.db.lock().await;
        OfflineQueue::new(db.connection()).get(id)
    }

    async fn get_all_by_status(&self, status: OfflineStatus) -> Result<Vec<OfflineRecord>> {
        let db = self.db.lock().await;
        OfflineQueue::new(db.connection()).get_all_by_status(status)
    }

    async fn delete_by_id(&self, id: &NoteId) -> Result<()> {
        let db = self.db.lock().await;
        OfflineQueue::new(db.connection()).delete_by_id(id)
    }

    async fn delete_if_unchanged(&self, id: &NoteId, note: &Note) -> Result<bool> {
        let db = self.db.lock().await;
        OfflineQueue::new(db.connection()).delete_if_unchanged(id, note)
    }
}

/// In-memory offline store for tests and embedders without a filesystem
#[derive(Clone, Default)]
pub struct MemoryOfflineStore {
    records: Arc<StdMutex<HashMap<NoteId, (u64, OfflineRecord)>>>,
    next_order: Arc<StdMutex<u64>>,
}

impl MemoryOfflineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_order(&self) -> u64 {
        let mut order = self.next_order.lock().unwrap_or_else(PoisonError::into_inner);
        *order += 1;
        *order
    }
}

#[async_trait]
impl OfflineStore for MemoryOfflineStore {
    async fn put(&self, id: &NoteId, note: &Note, status: OfflineStatus) -> Result<()> {
        let order = self.next_order();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), (order, OfflineRecord::new(id.clone(), note, status)));
        Ok(())
    }

    async fn get(&self, id: &NoteId) -> Result<Option<OfflineRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|(_, record)| record.clone()))
    }

    async fn get_all_by_status(&self, status: OfflineStatus) -> Result<Vec<OfflineRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matching = records
            .values()
            .filter(|(_, record)| record.status == status)
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by_key(|(order, _)| *order);
        Ok(matching.into_iter().map(|(_, record)| record).collect())
    }

    async fn delete_by_id(&self, id: &NoteId) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    async fn delete_if_unchanged(&self, id: &NoteId, note: &Note) -> Result<bool> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let unchanged = records.get(id).is_some_and(|(_, record)| {
            record.status == OfflineStatus::Offline
                && record.updated_at == note.updated_at
                && record.title == note.title
                && record.content == note.content
        });
        if unchanged {
            records.remove(id);
        }
        Ok(unchanged)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn server_id(raw: &str) -> NoteId {
        NoteId::server(raw).unwrap()
    }

    async fn exercise_store(store: &dyn OfflineStore) {
        let temp = NoteId::temporary();
        let synced = server_id("42");

        store
            .put(&temp, &Note::new("A", "B"), OfflineStatus::Offline)
            .await
            .unwrap();
        store
            .put(&synced, &Note::new("old", "gone"), OfflineStatus::Deleted)
            .await
            .unwrap();

        let offline = store.get_all_by_status(OfflineStatus::Offline).await.unwrap();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].id, temp);
        assert_eq!(offline[0].title, "A");

        let deleted = store.get_all_by_status(OfflineStatus::Deleted).await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, synced);
        assert_eq!(store.pending_counts().await.unwrap(), (1, 1));

        // Same key: last write wins, including the tag
        store
            .put(&temp, &Note::new("A2", "B2"), OfflineStatus::Offline)
            .await
            .unwrap();
        store
            .put(&synced, &Note::new("edited", "back"), OfflineStatus::Offline)
            .await
            .unwrap();
        let offline = store.get_all_by_status(OfflineStatus::Offline).await.unwrap();
        assert_eq!(offline.len(), 2);
        assert_eq!(store.get(&temp).await.unwrap().unwrap().title, "A2");
        assert!(store
            .get_all_by_status(OfflineStatus::Deleted)
            .await
            .unwrap()
            .is_empty());

        store.delete_by_id(&temp).await.unwrap();
        store.delete_by_id(&temp).await.unwrap();
        assert!(store.get(&temp).await.unwrap().is_none());
        assert_eq!(store.pending_counts().await.unwrap(), (1, 0));
    }

    async fn exercise_conditional_delete(store: &dyn OfflineStore) {
        let id = server_id("42");
        let acknowledged = Note::new("v1", "body");
        store.put(&id, &acknowledged, OfflineStatus::Offline).await.unwrap();

        let mut newer = Note::new("v2", "body");
        newer.updated_at = acknowledged.updated_at + chrono::Duration::seconds(1);
        store.put(&id, &newer, OfflineStatus::Offline).await.unwrap();

        assert!(!store.delete_if_unchanged(&id, &acknowledged).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().title, "v2");

        store.put(&id, &newer, OfflineStatus::Deleted).await.unwrap();
        assert!(!store.delete_if_unchanged(&id, &newer).await.unwrap());

        store.put(&id, &newer, OfflineStatus::Offline).await.unwrap();
        assert!(store.delete_if_unchanged(&id, &newer).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(!store.delete_if_unchanged(&id, &newer).await.unwrap());
    }

    #[tokio::test]
    async fn conditional_delete_keeps_newer_writes() {
        exercise_conditional_delete(&SqliteOfflineStore::open_in_memory().unwrap()).await;
        exercise_conditional_delete(&MemoryOfflineStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_store_keyed_by_id() {
        let store = SqliteOfflineStore::open_in_memory().unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn memory_store_keyed_by_id() {
        let store = MemoryOfflineStore::new();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");
        let note = Note::new("persist", "me");
        let id = NoteId::temporary();

        {
            let store = SqliteOfflineStore::open(&path).unwrap();
            store.put(&id, &note, OfflineStatus::Offline).await.unwrap();
        }

        let reopened = SqliteOfflineStore::open(&path).unwrap();
        let record = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, OfflineStatus::Offline);
        assert_eq!(record.content, "me");
        assert_eq!(
            record.updated_at.timestamp_millis(),
            note.updated_at.timestamp_millis()
        );
    }
}
