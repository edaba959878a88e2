//! In-memory note repository: what the UI renders.
//!
//! Every operation takes the lock once and replaces whole entries, so
//! concurrent writers never observe a half-updated note. Remote responses are
//! gated by a per-id write sequence: only the response to the most recent
//! write issued for an id may change that id's entry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::models::{Note, NoteEntry, NoteId, SyncStatus};

/// What the editor is showing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    /// A fresh, never-saved note
    New,
    Open(NoteId),
}

/// Result of applying a remote acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteApply {
    /// The entry is now `Synced` under the returned id
    Applied(NoteId),
    /// A newer write was issued meanwhile; the entry keeps its newer state.
    /// Any id remap has still been recorded.
    Stale(NoteId),
    /// The note was deleted locally while the request was in flight
    Deleted(NoteId),
}

/// An entry removed from the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub entry: Option<NoteEntry>,
    /// Whether the removed note was open in the editor
    pub was_selected: bool,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<NoteId, NoteEntry>,
    /// temporary id -> server id, kept after the remap so stale handles resolve
    aliases: HashMap<NoteId, NoteId>,
    /// latest write sequence issued per id
    sequences: HashMap<NoteId, u64>,
    next_sequence: u64,
    /// temporary ids with a create request in flight
    creating: HashSet<NoteId>,
    /// ids removed this session
    tombstones: HashSet<NoteId>,
    syncing: BTreeSet<NoteId>,
    selection: Selection,
    search_term: String,
}

impl State {
    fn resolve(&self, id: &NoteId) -> NoteId {
        self.aliases.get(id).unwrap_or(id).clone()
    }

    fn is_latest(&self, id: &NoteId, sequence: u64) -> bool {
        self.sequences.get(id) == Some(&sequence)
    }

    fn remap(&mut self, temporary: &NoteId, server: &NoteId) {
        if temporary == server {
            return;
        }
        if let Some(mut entry) = self.entries.remove(temporary) {
            entry.id = server.clone();
            self.entries.insert(server.clone(), entry);
        }
        if let Some(sequence) = self.sequences.remove(temporary) {
            self.sequences.insert(server.clone(), sequence);
        }
        if self.syncing.remove(temporary) {
            self.syncing.insert(server.clone());
        }
        if self.tombstones.remove(temporary) {
            self.tombstones.insert(server.clone());
        }
        if self.selection == Selection::Open(temporary.clone()) {
            self.selection = Selection::Open(server.clone());
        }
        self.aliases.insert(temporary.clone(), server.clone());
    }
}

#[derive(Debug, Default)]
pub struct NoteRepository {
    state: RwLock<State>,
}

impl NoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow a temporary id to its server id once the server has assigned one
    pub fn resolve(&self, id: &NoteId) -> NoteId {
        self.read().resolve(id)
    }

    pub fn get(&self, id: &NoteId) -> Option<NoteEntry> {
        let state = self.read();
        state.entries.get(&state.resolve(id)).cloned()
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Visible notes: filtered by the search term, newest first
    pub fn notes(&self) -> Vec<NoteEntry> {
        let state = self.read();
        let mut notes = state
            .entries
            .values()
            .filter(|entry| entry.matches(&state.search_term))
            .cloned()
            .collect::<Vec<_>>();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        notes
    }

    /// Replace the whole collection, e.g. on startup
    pub fn replace_all(&self, entries: impl IntoIterator<Item = NoteEntry>) {
        let mut state = self.write();
        state.entries = entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        state.syncing.clear();
        state.creating.clear();
        let still_open = match &state.selection {
            Selection::Open(id) => state.entries.contains_key(id),
            Selection::New | Selection::None => true,
        };
        if !still_open {
            state.selection = Selection::None;
        }
    }

    /// Optimistically write the local state of a note and issue a new write
    /// sequence for it. Returns the sequence the matching remote call must
    /// present to be applied.
    pub fn upsert_local(&self, id: &NoteId, note: &Note, status: SyncStatus) -> u64 {
        let mut state = self.write();
        let id = state.resolve(id);
        let entry = NoteEntry::from_note(id.clone(), note, status);
        debug_assert!(entry.is_consistent());
        state.tombstones.remove(&id);
        state.entries.insert(id.clone(), entry);
        if state.selection == Selection::New {
            state.selection = Selection::Open(id.clone());
        }
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.sequences.insert(id, sequence);
        sequence
    }

    /// Issue a new write sequence without touching the entry (replays)
    pub fn begin_write(&self, id: &NoteId) -> u64 {
        let mut state = self.write();
        let id = state.resolve(id);
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.sequences.insert(id, sequence);
        sequence
    }

    pub fn latest_sequence(&self, id: &NoteId) -> Option<u64> {
        let state = self.read();
        state.sequences.get(&state.resolve(id)).copied()
    }

    pub fn is_latest(&self, id: &NoteId, sequence: u64) -> bool {
        let state = self.read();
        state.is_latest(&state.resolve(id), sequence)
    }

    /// Claim the right to send the create for a temporary id.
    ///
    /// Returns `false` while another create for the same id is in flight.
    pub fn try_begin_create(&self, id: &NoteId) -> bool {
        let mut state = self.write();
        let id = state.resolve(id);
        id.is_temporary() && state.creating.insert(id)
    }

    pub fn finish_create(&self, id: &NoteId) {
        self.write().creating.remove(id);
    }

    pub fn is_creating(&self, id: &NoteId) -> bool {
        self.read().creating.contains(id)
    }

    /// Record a successful remote write.
    ///
    /// A create's server id is always recorded, even for a stale response,
    /// because the server now knows the note under that id. Status and
    /// timestamp are only adopted when `sequence` is still the latest.
    /// A note missing from the repository that was never deleted (not yet
    /// loaded) is adopted from `note`.
    pub fn apply_remote_success(
        &self,
        id: &NoteId,
        sequence: u64,
        server_id: Option<&NoteId>,
        updated_at: DateTime<Utc>,
        note: &Note,
    ) -> RemoteApply {
        let mut state = self.write();
        let mut target = state.resolve(id);
        if let Some(server_id) = server_id {
            if target.is_temporary() {
                state.remap(&target, server_id);
                target = server_id.clone();
            }
        }

        if state.tombstones.contains(&target) {
            return RemoteApply::Deleted(target);
        }
        if !state.is_latest(&target, sequence) {
            return RemoteApply::Stale(target);
        }

        let entry = state
            .entries
            .entry(target.clone())
            .or_insert_with(|| NoteEntry::from_note(target.clone(), note, SyncStatus::Synced));
        entry.sync_status = SyncStatus::Synced;
        entry.updated_at = updated_at;
        RemoteApply::Applied(target)
    }

    /// Mark a failed write as `Error`, unless a newer write superseded it.
    pub fn mark_error(&self, id: &NoteId, sequence: u64) -> bool {
        let mut state = self.write();
        let id = state.resolve(id);
        if !state.is_latest(&id, sequence) {
            return false;
        }
        state.entries.get_mut(&id).is_some_and(|entry| {
            entry.sync_status = SyncStatus::Error;
            true
        })
    }

    pub fn set_status(&self, id: &NoteId, status: SyncStatus) {
        let mut state = self.write();
        let id = state.resolve(id);
        if let Some(entry) = state.entries.get_mut(&id) {
            if status == SyncStatus::Synced && id.is_temporary() {
                return;
            }
            entry.sync_status = status;
        }
    }

    /// Remove a note. In-flight responses for it become stale and a
    /// tombstone remembers the deletion for the rest of the session.
    pub fn remove(&self, id: &NoteId) -> Removed {
        let mut state = self.write();
        let id = state.resolve(id);
        let entry = state.entries.remove(&id);
        state.sequences.remove(&id);
        state.syncing.remove(&id);
        state.tombstones.insert(id.clone());

        let was_selected = state.selection == Selection::Open(id);
        if was_selected {
            state.selection = Selection::None;
        }
        Removed {
            entry,
            was_selected,
        }
    }

    pub fn is_tombstoned(&self, id: &NoteId) -> bool {
        let state = self.read();
        state.tombstones.contains(&state.resolve(id))
    }

    /// Mark ids as mid-sync, setting matching entries to `Syncing`
    pub fn mark_syncing<'a>(&self, ids: impl IntoIterator<Item = &'a NoteId>) {
        let mut state = self.write();
        for id in ids {
            let id = state.resolve(id);
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.sync_status = SyncStatus::Syncing;
            }
            state.syncing.insert(id);
        }
    }

    pub fn clear_syncing<'a>(&self, ids: impl IntoIterator<Item = &'a NoteId>) {
        let mut state = self.write();
        for id in ids {
            let id = state.resolve(id);
            state.syncing.remove(&id);
        }
    }

    /// Identifiers currently mid-sweep, for progress indicators
    pub fn syncing_ids(&self) -> Vec<NoteId> {
        self.read().syncing.iter().cloned().collect()
    }

    pub fn selection(&self) -> Selection {
        self.read().selection.clone()
    }

    pub fn select_new(&self) {
        self.write().selection = Selection::New;
    }

    /// Open an existing note; returns the entry or `None` if unknown
    pub fn select(&self, id: &NoteId) -> Option<NoteEntry> {
        let mut state = self.write();
        let id = state.resolve(id);
        let entry = state.entries.get(&id).cloned()?;
        state.selection = Selection::Open(id);
        Some(entry)
    }

    pub fn close_selection(&self) {
        self.write().selection = Selection::None;
    }

    /// Close the editor if it shows `id`.
    pub fn close_if_showing(&self, id: &NoteId) -> bool {
        let mut state = self.write();
        let id = state.resolve(id);
        let showing = match &state.selection {
            Selection::Open(open) => state.resolve(open) == id,
            Selection::New | Selection::None => false,
        };
        if showing {
            state.selection = Selection::None;
        }
        showing
    }

    pub fn search_term(&self) -> String {
        self.read().search_term.clone()
    }

    pub fn set_search_term(&self, term: impl Into<String>) {
        self.write().search_term = term.into();
    }
}
