//! Test doubles shared by the engine and connectivity tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use crate::db::{MemoryOfflineStore, OfflineStore};
use crate::error::{Error, Result};
use crate::models::{Note, NoteId, OfflineRecord, OfflineStatus};
use crate::remote::{CreatedNote, NotePayload, RemoteNote, RemoteNoteService};

/// A remote call as observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create { title: String },
    Update { id: String, title: String },
    Delete { id: String },
}

/// Scripted in-memory remote note service
#[derive(Default)]
pub struct FakeRemote {
    notes: Mutex<BTreeMap<String, RemoteNote>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU32,
    unreachable: AtomicBool,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    hang: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a note that already exists on the server
    pub fn seed(&self, id: &str, title: &str, content: &str) {
        self.notes.lock().unwrap().insert(
            id.to_string(),
            RemoteNote {
                id: NoteId::server(id).unwrap(),
                title: title.to_string(),
                content: content.to_string(),
                updated_at: Utc::now(),
                synced: true,
            },
        );
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Never answer, so only a timeout ends the call
    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Hold every response until `release` is called
    pub fn pause(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, responses: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(responses);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Create { .. }))
            .count()
    }

    pub fn server_note(&self, id: &str) -> Option<RemoteNote> {
        self.notes.lock().unwrap().get(id).cloned()
    }

    pub fn server_len(&self) -> usize {
        self.notes.lock().unwrap().len()
    }

    /// Yield until at least `count` calls have been received
    pub async fn wait_for_calls(&self, count: usize) {
        while self.call_count() < count {
            tokio::task::yield_now().await;
        }
    }

    async fn enter(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check_reachable()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                message: "service unreachable".to_string(),
            });
        }
        Ok(())
    }

    fn server_error(what: &str) -> Error {
        Error::Api {
            status: 500,
            message: format!("{what} failed"),
        }
    }
}

#[async_trait]
impl RemoteNoteService for FakeRemote {
    async fn list(&self) -> Result<Vec<RemoteNote>> {
        self.enter(Call::List).await?;
        Ok(self.notes.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, payload: &NotePayload) -> Result<CreatedNote> {
        self.enter(Call::Create {
            title: payload.title.clone(),
        })
        .await?;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Self::server_error("create"));
        }

        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let updated_at = Utc::now();
        self.notes.lock().unwrap().insert(
            id.clone(),
            RemoteNote {
                id: NoteId::server(&id)?,
                title: payload.title.clone(),
                content: payload.content.clone(),
                updated_at,
                synced: payload.synced,
            },
        );
        Ok(CreatedNote {
            id: NoteId::server(id)?,
            updated_at,
        })
    }

    async fn update(&self, id: &NoteId, payload: &NotePayload) -> Result<DateTime<Utc>> {
        self.enter(Call::Update {
            id: id.to_string(),
            title: payload.title.clone(),
        })
        .await?;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::server_error("update"));
        }

        let updated_at = Utc::now();
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .entry(id.to_string())
            .or_insert_with(|| RemoteNote {
                id: id.clone(),
                title: String::new(),
                content: String::new(),
                updated_at,
                synced: true,
            });
        note.title.clone_from(&payload.title);
        note.content.clone_from(&payload.content);
        note.updated_at = updated_at;
        Ok(updated_at)
    }

    async fn delete(&self, id: &NoteId) -> Result<()> {
        self.enter(Call::Delete { id: id.to_string() }).await?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::server_error("delete"));
        }
        self.notes.lock().unwrap().remove(id.as_str());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }
}

/// An offline store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl OfflineStore for FailingStore {
    async fn put(&self, _id: &NoteId, _note: &Note, _status: OfflineStatus) -> Result<()> {
        Err(Error::Database("disk full".to_string()))
    }

    async fn get(&self, _id: &NoteId) -> Result<Option<OfflineRecord>> {
        Err(Error::Database("disk full".to_string()))
    }

    async fn get_all_by_status(&self, _status: OfflineStatus) -> Result<Vec<OfflineRecord>> {
        Err(Error::Database("disk full".to_string()))
    }

    async fn delete_by_id(&self, _id: &NoteId) -> Result<()> {
        Err(Error::Database("disk full".to_string()))
    }

    async fn delete_if_unchanged(&self, _id: &NoteId, _note: &Note) -> Result<bool> {
        Err(Error::Database("disk full".to_string()))
    }
}

/// Store operation a `GatedStore` can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Held {
    /// `get_all_by_status(Deleted)`, the sweep's second listing
    DeleteReads,
    /// `delete_if_unchanged`, the purge after an acknowledged write
    ConditionalDeletes,
}

/// In-memory store that can hold one kind of operation, so tests can
/// interleave saves with work the engine has already started
#[derive(Default)]
pub struct GatedStore {
    inner: MemoryOfflineStore,
    gate: Mutex<Option<(Held, Arc<Semaphore>)>>,
    held: AtomicUsize,
}

impl GatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every `operation` until `release` is called
    pub fn pause(&self, operation: Held) {
        *self.gate.lock().unwrap() = Some((operation, Arc::new(Semaphore::new(0))));
    }

    pub fn release(&self, operations: usize) {
        if let Some((_, gate)) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(operations);
        }
    }

    /// Yield until at least `count` operations have been held
    pub async fn wait_for_held(&self, count: usize) {
        while self.held.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    async fn hold(&self, operation: Held) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some((held, gate)) = gate {
            if held == operation {
                self.held.fetch_add(1, Ordering::SeqCst);
                gate.acquire().await.unwrap().forget();
            }
        }
    }
}

#[async_trait]
impl OfflineStore for GatedStore {
    async fn put(&self, id: &NoteId, note: &Note, status: OfflineStatus) -> Result<()> {
        self.inner.put(id, note, status).await
    }

    async fn get(&self, id: &NoteId) -> Result<Option<OfflineRecord>> {
        self.inner.get(id).await
    }

    async fn get_all_by_status(&self, status: OfflineStatus) -> Result<Vec<OfflineRecord>> {
        if status == OfflineStatus::Deleted {
            self.hold(Held::DeleteReads).await;
        }
        self.inner.get_all_by_status(status).await
    }

    async fn delete_by_id(&self, id: &NoteId) -> Result<()> {
        self.inner.delete_by_id(id).await
    }

    async fn delete_if_unchanged(&self, id: &NoteId, note: &Note) -> Result<bool> {
        self.hold(Held::ConditionalDeletes).await;
        self.inner.delete_if_unchanged(id, note).await
    }
}
