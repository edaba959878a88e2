use std::sync::Arc;

use notesync_core::connectivity::probe_once;
use notesync_core::db::{OfflineStore, SqliteOfflineStore};
use notesync_core::remote::RemoteNoteService;
use serde::Serialize;

use crate::commands::common::{build_remote, AppContext};
use crate::error::CliError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub online: bool,
    pub api_base_url: Option<String>,
    pub db_path: String,
    pub pending_writes: usize,
    pub pending_deletes: usize,
}

pub async fn run_status(context: &AppContext, as_json: bool) -> Result<(), CliError> {
    let report = collect_status(context, build_remote(&context.config)).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "connection:      {}",
        if report.online { "online" } else { "offline" }
    );
    println!(
        "server:          {}",
        report.api_base_url.as_deref().unwrap_or("(not configured)")
    );
    println!("queue:           {}", report.db_path);
    println!("pending writes:  {}", report.pending_writes);
    println!("pending deletes: {}", report.pending_deletes);
    Ok(())
}

pub async fn collect_status(
    context: &AppContext,
    remote: Arc<dyn RemoteNoteService>,
) -> Result<StatusReport, CliError> {
    let store = SqliteOfflineStore::open(&context.db_path)?;
    let (pending_writes, pending_deletes) = store.pending_counts().await?;
    let online =
        !context.offline && probe_once(remote.as_ref(), context.config.request_timeout()).await;

    Ok(StatusReport {
        online,
        api_base_url: context.config.api_base_url().ok(),
        db_path: context.db_path.display().to_string(),
        pending_writes,
        pending_deletes,
    })
}
