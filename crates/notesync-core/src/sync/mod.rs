//! Offline-first sync engine.
//!
//! Every local write is recorded in the offline store before any network
//! call, then applied optimistically to the repository. Remote calls are
//! bounded by the request timeout and their responses are only applied if no
//! newer write for the same note was issued meanwhile. The reconciliation
//! sweep replays whatever is left in the store once connectivity returns.

mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;

pub use retry::RetryBackoff;

use crate::config::ClientConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::db::OfflineStore;
use crate::error::{Error, Result};
use crate::models::{Note, NoteEntry, NoteId, OfflineRecord, OfflineStatus, SyncStatus};
use crate::remote::{CreatedNote, NotePayload, RemoteNoteService};
use crate::repository::{NoteRepository, RemoteApply, Selection};

const EVENT_CAPACITY: usize = 64;

/// Outcome of a save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "lowercase")]
pub enum SaveOutcome {
    /// Offline: queued for the next sweep
    Deferred(NoteId),
    /// Acknowledged by the server under this id
    Synced(NoteId),
    /// The remote call failed; the write stays queued
    Failed(NoteId),
    /// A newer write for the same note took over
    Superseded(NoteId),
    /// The note was deleted while the write was in flight
    Discarded(NoteId),
}

impl SaveOutcome {
    pub const fn id(&self) -> &NoteId {
        match self {
            Self::Deferred(id)
            | Self::Synced(id)
            | Self::Failed(id)
            | Self::Superseded(id)
            | Self::Discarded(id) => id,
        }
    }
}

/// Outcome of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteOutcome {
    /// Deleted on the server
    Deleted,
    /// Queued as a pending delete
    Deferred,
    /// Never reached the server, nothing to delete remotely
    LocalOnly,
}

/// Notifications for whatever front end drives the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    NoteSaved { id: NoteId, status: SyncStatus },
    NoteCreated { temporary: NoteId, server: NoteId },
    NoteSynced { id: NoteId },
    NoteFailed { id: NoteId, error: String },
    NoteDeleted { id: NoteId, outcome: DeleteOutcome },
    /// The editor was closed by the engine
    EditorClosed,
    NotesSynced { synced: usize, failed: usize },
    NotesDeleted { deleted: usize, failed: usize },
    ConnectivityChanged { online: bool },
}

/// Aggregate result of one reconciliation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub superseded: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    /// Another sweep was already running
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub const fn is_clean(&self) -> bool {
        self.failed == 0 && self.delete_failed == 0
    }

    pub const fn attempted(&self) -> usize {
        self.synced + self.failed + self.superseded + self.deleted + self.delete_failed
    }
}

pub struct SyncEngine<S, R> {
    store: S,
    remote: R,
    repository: NoteRepository,
    connectivity: ConnectivityMonitor,
    events: broadcast::Sender<SyncEvent>,
    request_timeout: Duration,
    sweep_guard: Mutex<()>,
    retry_signal: Notify,
    /// Last reachability announced to subscribers
    announced_online: AtomicBool,
}

impl<S: OfflineStore, R: RemoteNoteService> SyncEngine<S, R> {
    pub fn new(store: S, remote: R, connectivity: ConnectivityMonitor) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let announced_online = AtomicBool::new(connectivity.is_online());
        Self {
            store,
            remote,
            repository: NoteRepository::new(),
            connectivity,
            events,
            request_timeout: ClientConfig::default().request_timeout(),
            sweep_guard: Mutex::new(()),
            retry_signal: Notify::new(),
            announced_online,
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub const fn repository(&self) -> &NoteRepository {
        &self.repository
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(self.request_timeout)))
    }

    /// Populate the repository from the server (when online) overlaid with
    /// everything still queued locally. Returns the number of visible notes.
    pub async fn load(&self) -> Result<usize> {
        let mut entries = HashMap::<NoteId, NoteEntry>::new();

        if self.is_online() {
            match self.call(self.remote.list()).await {
                Ok(notes) => {
                    for note in notes {
                        let status = if note.synced {
                            SyncStatus::Synced
                        } else {
                            SyncStatus::Unsynced
                        };
                        let entry = NoteEntry {
                            id: note.id.clone(),
                            title: note.title,
                            content: note.content,
                            updated_at: note.updated_at,
                            sync_status: status,
                        };
                        entries.insert(note.id, entry);
                    }
                }
                Err(error) => {
                    tracing::warn!("Failed to list remote notes, showing local queue only: {error}");
                }
            }
        }

        for record in self.store.get_all_by_status(OfflineStatus::Offline).await? {
            let entry = NoteEntry::from_note(record.id.clone(), &record.note(), SyncStatus::Unsynced);
            entries.insert(record.id, entry);
        }
        for record in self.store.get_all_by_status(OfflineStatus::Deleted).await? {
            entries.remove(&record.id);
        }

        let count = entries.len();
        self.repository.replace_all(entries.into_values());
        tracing::debug!("Loaded {count} notes");
        Ok(count)
    }

    /// Save a new or edited note.
    ///
    /// The write lands in the offline store first; a store failure is
    /// returned and leaves the repository untouched. Remote failures are not
    /// errors: they are reported through the outcome and the entry's status.
    pub async fn save_or_update_note(&self, note: Note) -> Result<SaveOutcome> {
        let id = note
            .id
            .as_ref()
            .map_or_else(NoteId::temporary, |id| self.repository.resolve(id));
        let note = Note {
            id: Some(id.clone()),
            updated_at: Utc::now(),
            ..note
        };
        let online = self.is_online();

        self.store.put(&id, &note, OfflineStatus::Offline).await?;

        let status = if online {
            SyncStatus::Syncing
        } else {
            SyncStatus::Unsynced
        };
        let sequence = self.repository.upsert_local(&id, &note, status);
        self.emit(SyncEvent::NoteSaved {
            id: id.clone(),
            status,
        });

        if !online {
            tracing::debug!("Offline, queued note {id}");
            return Ok(SaveOutcome::Deferred(id));
        }

        let outcome = self.push(&id, sequence, &note).await;
        // A note created from the editor closes it once the server has it
        if let SaveOutcome::Synced(server) = &outcome {
            if id.is_temporary() && self.repository.close_if_showing(server) {
                self.emit(SyncEvent::EditorClosed);
            }
        }
        Ok(outcome)
    }

    /// Send one write to the server and apply the response.
    async fn push(&self, id: &NoteId, sequence: u64, note: &Note) -> SaveOutcome {
        if id.is_temporary() {
            self.push_create(id, sequence, note).await
        } else {
            self.push_update(id, sequence, note).await
        }
    }

    async fn push_create(&self, temporary: &NoteId, sequence: u64, note: &Note) -> SaveOutcome {
        if !self.repository.try_begin_create(temporary) {
            // The in-flight create picks up this write when it completes
            tracing::debug!("Create for {temporary} already in flight");
            return SaveOutcome::Superseded(temporary.clone());
        }

        let payload = NotePayload::new(&note.title, &note.content);
        let result = self.call(self.remote.create(&payload)).await;
        self.repository.finish_create(temporary);

        match result {
            Ok(created) => self.on_created(temporary, sequence, note, created).await,
            Err(error) => {
                tracing::warn!("Failed to create note {temporary}: {error}");
                // Only one create per temporary id runs, so this result is
                // never older than another response for the same note
                self.repository.set_status(temporary, SyncStatus::Error);
                self.fail(temporary, &error)
            }
        }
    }

    async fn on_created(
        &self,
        temporary: &NoteId,
        sequence: u64,
        note: &Note,
        created: CreatedNote,
    ) -> SaveOutcome {
        let applied = self.repository.apply_remote_success(
            temporary,
            sequence,
            Some(&created.id),
            created.updated_at,
            note,
        );

        match applied {
            RemoteApply::Applied(server) => {
                self.purge_acknowledged(temporary, note).await;
                tracing::info!("Note {temporary} created as {server}");
                self.emit(SyncEvent::NoteCreated {
                    temporary: temporary.clone(),
                    server: server.clone(),
                });
                SaveOutcome::Synced(server)
            }
            RemoteApply::Stale(server) => {
                self.emit(SyncEvent::NoteCreated {
                    temporary: temporary.clone(),
                    server: server.clone(),
                });
                self.rekey_queued(temporary, &server).await;

                // Edits made while the create was in flight go out as an update
                let (Some(latest), Some(entry)) = (
                    self.repository.latest_sequence(&server),
                    self.repository.get(&server),
                ) else {
                    return SaveOutcome::Superseded(server);
                };
                tracing::debug!("Note {server} changed during create, sending follow-up update");
                self.push_update(&server, latest, &entry.to_note()).await
            }
            RemoteApply::Deleted(server) => {
                tracing::info!("Note {temporary} was deleted while being created as {server}");
                self.purge_queued(temporary).await;
                self.delete_or_queue(&server, note).await;
                SaveOutcome::Discarded(server)
            }
        }
    }

    async fn push_update(&self, id: &NoteId, sequence: u64, note: &Note) -> SaveOutcome {
        let payload = NotePayload::new(&note.title, &note.content);
        match self.call(self.remote.update(id, &payload)).await {
            Ok(updated_at) => self.on_updated(id, sequence, note, updated_at).await,
            Err(error) => {
                tracing::warn!("Failed to update note {id}: {error}");
                if self.repository.mark_error(id, sequence) {
                    self.fail(id, &error)
                } else {
                    SaveOutcome::Superseded(id.clone())
                }
            }
        }
    }

    async fn on_updated(
        &self,
        id: &NoteId,
        sequence: u64,
        note: &Note,
        updated_at: DateTime<Utc>,
    ) -> SaveOutcome {
        match self
            .repository
            .apply_remote_success(id, sequence, None, updated_at, note)
        {
            RemoteApply::Applied(id) => {
                self.purge_acknowledged(&id, note).await;
                self.emit(SyncEvent::NoteSynced { id: id.clone() });
                SaveOutcome::Synced(id)
            }
            RemoteApply::Stale(id) => SaveOutcome::Superseded(id),
            RemoteApply::Deleted(id) => SaveOutcome::Discarded(id),
        }
    }

    fn fail(&self, id: &NoteId, error: &Error) -> SaveOutcome {
        self.emit(SyncEvent::NoteFailed {
            id: id.clone(),
            error: error.to_string(),
        });
        self.retry_signal.notify_one();
        SaveOutcome::Failed(id.clone())
    }

    /// Drop the queued write the server just acknowledged. A newer write
    /// queued meanwhile stays for its own push or the next sweep.
    async fn purge_acknowledged(&self, id: &NoteId, note: &Note) {
        match self.store.delete_if_unchanged(id, note).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Queued write for {id} changed, keeping it"),
            Err(error) => tracing::warn!("Failed to clear queued write for {id}: {error}"),
        }
    }

    /// Drop the queued write for `id` unless it has become a pending delete.
    async fn purge_queued(&self, id: &NoteId) {
        let result = match self.store.get(id).await {
            Ok(Some(record)) if record.status == OfflineStatus::Offline => {
                self.store.delete_by_id(id).await
            }
            Ok(_) => Ok(()),
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            tracing::warn!("Failed to clear queued write for {id}: {error}");
        }
    }

    /// Move a queued write from a temporary id to the server id it now has.
    ///
    /// A record already queued under the server id is newer and wins.
    async fn rekey_queued(&self, temporary: &NoteId, server: &NoteId) {
        let result = async {
            if let Some(record) = self.store.get(temporary).await? {
                if self.store.get(server).await?.is_none() {
                    self.store.put(server, &record.note(), record.status).await?;
                }
                self.store.delete_by_id(temporary).await?;
            }
            Ok::<_, Error>(())
        }
        .await;
        if let Err(error) = result {
            tracing::warn!("Failed to move queued write {temporary} to {server}: {error}");
        }
    }

    async fn queue_delete(&self, id: &NoteId, note: &Note) -> Result<()> {
        self.store.put(id, note, OfflineStatus::Deleted).await
    }

    /// Delete on the server, or queue the delete if that fails.
    async fn delete_or_queue(&self, id: &NoteId, note: &Note) {
        match self.call(self.remote.delete(id)).await {
            Ok(()) => {}
            Err(error) => {
                tracing::warn!("Failed to delete note {id}, queueing: {error}");
                if let Err(error) = self.queue_delete(id, note).await {
                    tracing::error!("Failed to queue delete for {id}: {error}");
                }
                self.retry_signal.notify_one();
            }
        }
    }

    /// Delete a note.
    ///
    /// A note the server never saw is only dropped locally. Otherwise the
    /// delete goes out immediately when online and is queued when offline or
    /// when the remote call fails. The note leaves the repository either way.
    pub async fn delete_note(&self, id: &NoteId) -> Result<DeleteOutcome> {
        let id = self.repository.resolve(id);

        let outcome = if id.is_temporary() {
            self.store.delete_by_id(&id).await?;
            DeleteOutcome::LocalOnly
        } else if self.is_online() {
            match self.call(self.remote.delete(&id)).await {
                Ok(()) => {
                    self.store.delete_by_id(&id).await?;
                    DeleteOutcome::Deleted
                }
                Err(error) => {
                    tracing::warn!("Failed to delete note {id}, queueing: {error}");
                    self.queue_delete(&id, &self.tombstone_note(&id)).await?;
                    self.retry_signal.notify_one();
                    DeleteOutcome::Deferred
                }
            }
        } else {
            self.queue_delete(&id, &self.tombstone_note(&id)).await?;
            DeleteOutcome::Deferred
        };

        let removed = self.repository.remove(&id);
        if removed.was_selected {
            self.emit(SyncEvent::EditorClosed);
        }
        tracing::debug!("Deleted note {id}: {outcome:?}");
        self.emit(SyncEvent::NoteDeleted { id, outcome });
        Ok(outcome)
    }

    fn tombstone_note(&self, id: &NoteId) -> Note {
        self.repository
            .get(id)
            .map_or_else(|| Note::new("", ""), |entry| entry.to_note())
    }

    /// Replay everything in the offline store.
    ///
    /// Queued writes and deletes run concurrently and each one succeeds or
    /// fails on its own. Returns a skipped report if a sweep is already
    /// running.
    pub async fn sync_offline_notes(&self) -> Result<SyncReport> {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            tracing::debug!("Sweep already running, skipping");
            return Ok(SyncReport::skipped());
        };

        let writes = self.store.get_all_by_status(OfflineStatus::Offline).await?;
        let deletes = self.store.get_all_by_status(OfflineStatus::Deleted).await?;
        if writes.is_empty() && deletes.is_empty() {
            return Ok(SyncReport::default());
        }

        tracing::info!(
            "Replaying {} queued writes and {} queued deletes",
            writes.len(),
            deletes.len()
        );
        let ids = writes
            .iter()
            .chain(&deletes)
            .map(|record| record.id.clone())
            .collect::<Vec<_>>();
        self.repository.mark_syncing(&ids);

        let (write_outcomes, delete_outcomes) = futures::join!(
            join_all(writes.iter().map(|record| self.replay_write(record))),
            join_all(deletes.iter().map(|record| self.replay_delete(record))),
        );
        self.repository.clear_syncing(&ids);

        let mut report = SyncReport::default();
        for outcome in &write_outcomes {
            match outcome {
                SaveOutcome::Synced(_) => report.synced += 1,
                SaveOutcome::Failed(_) => report.failed += 1,
                SaveOutcome::Deferred(_) | SaveOutcome::Superseded(_) | SaveOutcome::Discarded(_) => {
                    report.superseded += 1;
                }
            }
        }
        for deleted in delete_outcomes {
            if deleted {
                report.deleted += 1;
            } else {
                report.delete_failed += 1;
            }
        }

        if !writes.is_empty() {
            self.emit(SyncEvent::NotesSynced {
                synced: report.synced,
                failed: report.failed,
            });
        }
        if !deletes.is_empty() {
            self.emit(SyncEvent::NotesDeleted {
                deleted: report.deleted,
                failed: report.delete_failed,
            });
        }
        tracing::info!("Sweep finished: {report:?}");
        Ok(report)
    }

    /// Push the queued write as it is now, not as the sweep first listed it.
    ///
    /// A save may have sent and cleared the record since, or replaced it with
    /// a newer payload; the store is reread right before the new sequence is
    /// issued, with no await in between.
    async fn replay_write(&self, listed: &OfflineRecord) -> SaveOutcome {
        let current = match self.store.get(&listed.id).await {
            Ok(Some(record)) if record.status == OfflineStatus::Offline => record,
            Ok(_) => {
                tracing::debug!("Queued write for {} already handled", listed.id);
                return SaveOutcome::Superseded(self.repository.resolve(&listed.id));
            }
            Err(error) => {
                tracing::warn!("Failed to reread queued write for {}: {error}", listed.id);
                return self.fail(&self.repository.resolve(&listed.id), &error);
            }
        };

        let id = self.repository.resolve(&current.id);
        if id.is_temporary() && self.repository.is_creating(&id) {
            return SaveOutcome::Superseded(id);
        }
        let sequence = self.repository.begin_write(&id);
        self.push(&id, sequence, &current.note()).await
    }

    async fn replay_delete(&self, record: &OfflineRecord) -> bool {
        if record.id.is_temporary() {
            self.purge_delete(&record.id).await;
            return true;
        }
        match self.call(self.remote.delete(&record.id)).await {
            Ok(()) => {
                self.purge_delete(&record.id).await;
                true
            }
            Err(error) => {
                tracing::warn!("Failed to replay delete for {}: {error}", record.id);
                self.retry_signal.notify_one();
                false
            }
        }
    }

    async fn purge_delete(&self, id: &NoteId) {
        if let Err(error) = self.store.delete_by_id(id).await {
            tracing::warn!("Failed to clear queued delete for {id}: {error}");
        }
    }

    /// Publish a reachability reading; a transition to online runs a sweep.
    pub async fn set_reachable(&self, reachable: bool) -> Result<Option<SyncReport>> {
        self.connectivity.set_reachable(reachable);
        if self.announce_connectivity(reachable) && reachable {
            self.sync_offline_notes().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Emit `ConnectivityChanged` once per transition, whichever path saw it
    /// first. Returns whether this call announced it.
    fn announce_connectivity(&self, online: bool) -> bool {
        if self.announced_online.swap(online, Ordering::SeqCst) == online {
            return false;
        }
        self.emit(SyncEvent::ConnectivityChanged { online });
        true
    }

    /// Open a blank editor
    pub fn new_note(&self) {
        self.repository.select_new();
    }

    pub fn select_note(&self, id: &NoteId) -> Result<NoteEntry> {
        self.repository
            .select(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn close_editor(&self) {
        self.repository.close_selection();
    }

    /// The note shown in the editor, if any
    pub fn current_note(&self) -> Option<Note> {
        match self.repository.selection() {
            Selection::None => None,
            Selection::New => Some(Note::new("", "")),
            Selection::Open(id) => self.repository.get(&id).map(|entry| entry.to_note()),
        }
    }

    pub fn notes(&self) -> Vec<NoteEntry> {
        self.repository.notes()
    }

    pub fn set_search_term(&self, term: impl Into<String>) {
        self.repository.set_search_term(term);
    }

    pub fn syncing_ids(&self) -> Vec<NoteId> {
        self.repository.syncing_ids()
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: OfflineStore + 'static,
    R: RemoteNoteService + 'static,
{
    /// Sweep every time connectivity comes back.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut receiver = self.connectivity.subscribe();
        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let online = *receiver.borrow_and_update();
                if !engine.announce_connectivity(online) || !online {
                    continue;
                }
                if let Err(error) = engine.sync_offline_notes().await {
                    tracing::warn!("Reconnect sweep failed: {error}");
                }
            }
        })
    }

    /// Retry failed remote calls with exponential backoff.
    ///
    /// Wakes whenever a remote call fails, then sweeps until a sweep comes
    /// back clean or connectivity is lost.
    pub fn spawn_retry_loop(self: &Arc<Self>, mut backoff: RetryBackoff) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                engine.retry_signal.notified().await;
                loop {
                    let delay = backoff.next_delay();
                    tracing::debug!("Retrying queued writes in {delay:?}");
                    tokio::time::sleep(delay).await;

                    if !engine.is_online() {
                        backoff.reset();
                        break;
                    }
                    match engine.sync_offline_notes().await {
                        Ok(report) if report.is_clean() => {
                            backoff.reset();
                            break;
                        }
                        Ok(report) => {
                            tracing::debug!("Retry sweep incomplete: {report:?}");
                            backoff.record_failure();
                        }
                        Err(error) => {
                            tracing::warn!("Retry sweep failed: {error}");
                            backoff.record_failure();
                        }
                    }
                }
            }
        })
    }
}
