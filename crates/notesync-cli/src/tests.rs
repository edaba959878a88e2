use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use notesync_core::config::ClientConfig;
use notesync_core::db::OfflineStore;
use notesync_core::{Note, NoteEntry, NoteId, SaveOutcome, SyncEvent, SyncReport, SyncStatus};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::commands::common::{
    default_editor, describe_event, describe_save_outcome, find_note, format_note_lines,
    format_relative_time, normalize_content, normalize_note_identifier, note_preview,
    open_engine, open_engine_with_remote, AppContext, UnconfiguredRemote,
};
use crate::commands::config::{run_config_init, ConfigUpdate};
use crate::commands::status::collect_status;
use crate::commands::sync::format_sync_report;
use crate::error::CliError;

fn entry(id: &str, title: &str, content: &str) -> NoteEntry {
    NoteEntry {
        id: id.parse().unwrap(),
        title: title.to_string(),
        content: content.to_string(),
        updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        sync_status: SyncStatus::Synced,
    }
}

fn offline_context(dir: &tempfile::TempDir) -> AppContext {
    AppContext::new(
        ClientConfig::default(),
        Some(dir.path().join("offline.db")),
        true,
    )
    .unwrap()
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn normalize_note_identifier_rejects_empty() {
    assert!(matches!(
        normalize_note_identifier(" \n "),
        Err(CliError::EmptyNoteId)
    ));
    assert_eq!(normalize_note_identifier("  abc123  ").unwrap(), "abc123");
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn note_preview_prefers_title_then_first_line() {
    assert_eq!(note_preview(&entry("1", "Groceries", "milk"), 40), "Groceries");
    assert_eq!(
        note_preview(&entry("1", " ", "first   line\nsecond"), 40),
        "first line"
    );
    assert_eq!(
        note_preview(
            &entry("1", "This is a very long sentence that should be shortened", ""),
            20
        ),
        "This is a very lo..."
    );
}

#[test]
fn format_note_lines_include_status() {
    let mut pending = entry("offline-1700000000000", "Draft", "");
    pending.sync_status = SyncStatus::Unsynced;
    let lines = format_note_lines(&[pending]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("offline-1700000000000"));
    assert!(lines[0].contains("unsynced"));
    assert!(lines[0].contains("Draft"));
}

#[test]
fn find_note_supports_exact_and_prefix_id() {
    let notes = vec![
        entry("abc123", "A", ""),
        entry("abc124", "B", ""),
        entry("xyz", "C", ""),
    ];

    assert_eq!(find_note(&notes, "abc123").unwrap().title, "A");
    assert_eq!(find_note(&notes, "xy").unwrap().title, "C");
    assert!(matches!(
        find_note(&notes, "abc"),
        Err(CliError::AmbiguousNoteId(message)) if message.contains("abc123, abc124")
    ));
    assert!(matches!(
        find_note(&notes, "nope"),
        Err(CliError::NoteNotFound(_))
    ));
}

#[test]
fn save_outcomes_are_described() {
    let id = NoteId::server("42").unwrap();
    assert_eq!(describe_save_outcome(&SaveOutcome::Synced(id.clone())), "42");
    assert_eq!(
        describe_save_outcome(&SaveOutcome::Deferred(id.clone())),
        "42 (saved offline, will sync when reachable)"
    );
    assert!(describe_save_outcome(&SaveOutcome::Failed(id)).contains("queued for retry"));
}

#[test]
fn only_user_facing_events_are_described() {
    assert_eq!(
        describe_event(&SyncEvent::NotesSynced {
            synced: 2,
            failed: 1
        })
        .as_deref(),
        Some("Notes Synced: 2 synced, 1 failed")
    );
    assert_eq!(describe_event(&SyncEvent::EditorClosed), None);
}

#[test]
fn sync_report_summary() {
    assert_eq!(format_sync_report(&SyncReport::default()), "Nothing to sync");
    let report = SyncReport {
        synced: 2,
        delete_failed: 1,
        ..SyncReport::default()
    };
    assert_eq!(
        format_sync_report(&report),
        "Synced 2 note(s), 0 failed; deleted 0 note(s), 1 failed"
    );
}

#[test]
fn config_init_validates_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let saved = run_config_init(
        &path,
        ConfigUpdate {
            api_url: Some("https://notes.example.com/".to_string()),
            request_timeout: Some(4),
            ..ConfigUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(saved.api_base_url.as_deref(), Some("https://notes.example.com"));

    let loaded = ClientConfig::load_from_path(&path).unwrap();
    assert_eq!(loaded.request_timeout_secs, 4);
    assert_eq!(loaded.api_base_url().unwrap(), "https://notes.example.com");

    assert!(run_config_init(
        &path,
        ConfigUpdate {
            api_url: Some("notes.example.com".to_string()),
            ..ConfigUpdate::default()
        },
    )
    .is_err());
    assert!(matches!(
        run_config_init(
            &path,
            ConfigUpdate {
                probe_interval: Some(0),
                ..ConfigUpdate::default()
            },
        ),
        Err(CliError::Config(_))
    ));
}

#[tokio::test]
async fn offline_changes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let context = offline_context(&dir);

    {
        let engine = open_engine(&context).await.unwrap();
        let outcome = engine
            .save_or_update_note(Note::new("Queued", "written offline"))
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Deferred(ref id) if id.is_temporary()));
    }

    let engine = open_engine(&context).await.unwrap();
    let notes = engine.notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Queued");
    assert_eq!(notes[0].sync_status, SyncStatus::Unsynced);

    let status = collect_status(&context, Arc::new(UnconfiguredRemote))
        .await
        .unwrap();
    assert!(!status.online);
    assert_eq!((status.pending_writes, status.pending_deletes), (1, 0));
    assert_eq!(status.api_base_url, None);
}

#[tokio::test]
async fn unconfigured_remote_keeps_client_offline() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = offline_context(&dir);
    context.offline = false;

    let engine = open_engine_with_remote(&context, Arc::new(UnconfiguredRemote))
        .await
        .unwrap();
    assert!(!engine.is_online());
}

type ServerNotes = Arc<Mutex<Vec<Value>>>;

async fn list_notes(State(notes): State<ServerNotes>) -> Json<Value> {
    let notes = notes.lock().unwrap().clone();
    Json(json!({ "statusCode": 200, "data": notes }))
}

async fn create_note(State(notes): State<ServerNotes>, Json(body): Json<Value>) -> Json<Value> {
    let mut notes = notes.lock().unwrap();
    let note = json!({
        "_id": format!("srv-{}", notes.len() + 1),
        "title": body["title"],
        "content": body["content"],
        "synced": body["synced"],
        "updatedAt": "2024-05-01T10:00:00Z",
    });
    notes.push(note.clone());
    Json(json!({ "statusCode": 201, "data": note }))
}

async fn update_note(
    State(notes): State<ServerNotes>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut notes = notes.lock().unwrap();
    if let Some(note) = notes.iter_mut().find(|note| note["_id"] == id.as_str()) {
        note["title"] = body["title"].clone();
        note["content"] = body["content"].clone();
    }
    Json(json!({ "statusCode": 200, "data": { "_id": id } }))
}

async fn delete_note(State(notes): State<ServerNotes>, UrlPath(id): UrlPath<String>) -> Json<Value> {
    notes.lock().unwrap().retain(|note| note["_id"] != id.as_str());
    Json(json!({ "statusCode": 200 }))
}

async fn spawn_fake_server(notes: ServerNotes) -> String {
    let router = Router::new()
        .route("/api/v1/note/getnotes", get(list_notes))
        .route("/api/v1/note/createnote", post(create_note))
        .route("/api/v1/note/{id}", put(update_note).delete(delete_note))
        .with_state(notes);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn offline_note_reaches_server_on_next_sync() {
    let notes = ServerNotes::default();
    let base_url = spawn_fake_server(Arc::clone(&notes)).await;
    let dir = tempfile::tempdir().unwrap();

    let config = ClientConfig {
        api_base_url: Some(base_url),
        request_timeout_secs: 5,
        ..ClientConfig::default()
    };
    let offline = AppContext::new(config, Some(dir.path().join("offline.db")), true).unwrap();
    let online = AppContext {
        offline: false,
        ..offline.clone()
    };

    {
        let engine = open_engine(&offline).await.unwrap();
        engine
            .save_or_update_note(Note::new("Trip", "pack boots"))
            .await
            .unwrap();
    }
    assert!(notes.lock().unwrap().is_empty());

    let engine = open_engine(&online).await.unwrap();
    assert!(engine.is_online());
    let report = tokio::time::timeout(Duration::from_secs(10), engine.sync_offline_notes())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.synced, 1);

    let server_notes = notes.lock().unwrap().clone();
    assert_eq!(server_notes.len(), 1);
    assert_eq!(server_notes[0]["title"], "Trip");
    assert_eq!(engine.store().pending_counts().await.unwrap(), (0, 0));
    assert_eq!(engine.notes()[0].id.as_str(), "srv-1");
    assert_eq!(engine.notes()[0].sync_status, SyncStatus::Synced);
}
