use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notesync_core::config::ClientConfig;
use notesync_core::connectivity::{probe_once, ConnectivityMonitor};
use notesync_core::db::SqliteOfflineStore;
use notesync_core::remote::{CreatedNote, HttpNoteService, NotePayload, RemoteNote, RemoteNoteService};
use notesync_core::{NoteEntry, NoteId, SaveOutcome, SyncEngine, SyncEvent, SyncStatus};
use serde::Serialize;

use crate::error::CliError;

pub type CliEngine = SyncEngine<SqliteOfflineStore, Arc<dyn RemoteNoteService>>;

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: ClientConfig,
    pub db_path: PathBuf,
    /// Skip the startup probe and stay offline
    pub offline: bool,
}

impl AppContext {
    pub fn new(mut config: ClientConfig, db_path: Option<PathBuf>, offline: bool) -> Result<Self, CliError> {
        if let Some(path) = db_path {
            config.db_path = Some(path);
        }
        Ok(Self {
            db_path: config.db_path()?,
            config,
            offline,
        })
    }
}

/// Stand-in remote used when no API URL is configured; every call fails,
/// so the client stays offline and keeps queueing.
pub struct UnconfiguredRemote;

impl UnconfiguredRemote {
    fn error() -> notesync_core::Error {
        notesync_core::Error::Config("remote API URL is not configured".to_string())
    }
}

#[async_trait]
impl RemoteNoteService for UnconfiguredRemote {
    async fn list(&self) -> notesync_core::Result<Vec<RemoteNote>> {
        Err(Self::error())
    }

    async fn create(&self, _payload: &NotePayload) -> notesync_core::Result<CreatedNote> {
        Err(Self::error())
    }

    async fn update(
        &self,
        _id: &NoteId,
        _payload: &NotePayload,
    ) -> notesync_core::Result<DateTime<Utc>> {
        Err(Self::error())
    }

    async fn delete(&self, _id: &NoteId) -> notesync_core::Result<()> {
        Err(Self::error())
    }
}

pub fn build_remote(config: &ClientConfig) -> Arc<dyn RemoteNoteService> {
    match HttpNoteService::from_config(config) {
        Ok(service) => Arc::new(service),
        Err(error) => {
            tracing::debug!("Remote sync disabled: {error}");
            Arc::new(UnconfiguredRemote)
        }
    }
}

/// Open the offline queue, probe the server once, and load the note list.
pub async fn open_engine(context: &AppContext) -> Result<CliEngine, CliError> {
    open_engine_with_remote(context, build_remote(&context.config)).await
}

pub async fn open_engine_with_remote(
    context: &AppContext,
    remote: Arc<dyn RemoteNoteService>,
) -> Result<CliEngine, CliError> {
    let store = SqliteOfflineStore::open(&context.db_path)?;
    let timeout = context.config.request_timeout();

    let online = !context.offline && probe_once(remote.as_ref(), timeout).await;
    if !online {
        tracing::info!("Working offline; changes will be queued locally");
    }

    let engine = SyncEngine::new(store, remote, ConnectivityMonitor::new(online))
        .with_request_timeout(timeout);
    engine.load().await?;
    Ok(engine)
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub updated_at: String,
    pub relative_time: String,
    pub sync_status: SyncStatus,
}

/// Find a note by exact id or unique id prefix
pub fn find_note(notes: &[NoteEntry], query: &str) -> Result<NoteEntry, CliError> {
    if let Some(note) = notes.iter().find(|note| note.id.as_str() == query) {
        return Ok(note.clone());
    }

    let matching = notes
        .iter()
        .filter(|note| note.id.as_str().starts_with(query))
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(query.to_string())),
        [note] => Ok((*note).clone()),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|note| note.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_note_lines(notes: &[NoteEntry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let id = short_id(&note.id);
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at.timestamp_millis(), now_ms);
            format!(
                "{id:<22}  {status:<8}  {preview:<40}  {relative_time}",
                status = note.sync_status.as_str()
            )
        })
        .collect()
}

pub fn note_to_list_item(note: &NoteEntry) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        updated_at: note.updated_at.to_rfc3339(),
        relative_time: format_relative_time(note.updated_at.timestamp_millis(), now_ms),
        sync_status: note.sync_status,
    }
}

fn short_id(id: &NoteId) -> String {
    id.as_str().chars().take(22).collect()
}

/// Title if present, otherwise the first line of content
pub fn note_preview(note: &NoteEntry, max_chars: usize) -> String {
    let source = if note.title.trim().is_empty() {
        note.content.lines().next().unwrap_or("")
    } else {
        note.title.as_str()
    };
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn describe_save_outcome(outcome: &SaveOutcome) -> String {
    match outcome {
        SaveOutcome::Synced(id) => id.to_string(),
        SaveOutcome::Deferred(id) => format!("{id} (saved offline, will sync when reachable)"),
        SaveOutcome::Failed(id) => format!("{id} (sync failed, queued for retry)"),
        SaveOutcome::Superseded(id) => format!("{id} (superseded by a newer save)"),
        SaveOutcome::Discarded(id) => format!("{id} (deleted before sync finished)"),
    }
}

/// One line per event worth showing to a user
pub fn describe_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::NotesSynced { synced, failed } => {
            Some(format!("Notes Synced: {synced} synced, {failed} failed"))
        }
        SyncEvent::NotesDeleted { deleted, failed } => {
            Some(format!("Notes Deleted: {deleted} deleted, {failed} failed"))
        }
        SyncEvent::ConnectivityChanged { online: true } => Some("Online".to_string()),
        SyncEvent::ConnectivityChanged { online: false } => {
            Some("Offline, queueing changes".to_string())
        }
        SyncEvent::NoteCreated { temporary, server } => {
            Some(format!("Created {server} (was {temporary})"))
        }
        SyncEvent::NoteFailed { id, error } => Some(format!("Failed to sync {id}: {error}")),
        SyncEvent::NoteSaved { .. }
        | SyncEvent::NoteSynced { .. }
        | SyncEvent::NoteDeleted { .. }
        | SyncEvent::EditorClosed => None,
    }
}

pub fn resolve_note_content(content_parts: &[String], allow_empty: bool) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if allow_empty {
        return Ok(String::new());
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let status = match Command::new(editor).arg(file_path).status() {
        Ok(status) => status,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // EDITOR may carry arguments, e.g. "code --wait"
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };
            Command::new(program).args(parts).arg(file_path).status()?
        }
        Err(err) => return Err(CliError::Io(err)),
    };

    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("notesync-note-{}-{now}.md", std::process::id()))
}
