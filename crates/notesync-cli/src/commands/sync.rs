use notesync_core::SyncReport;

use crate::commands::common::{open_engine, AppContext};
use crate::error::CliError;

pub async fn run_sync(context: &AppContext) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    if !engine.is_online() {
        return Err(CliError::Offline);
    }

    let report = engine.sync_offline_notes().await?;
    println!("{}", format_sync_report(&report));

    let failed = report.failed + report.delete_failed;
    if failed > 0 {
        return Err(CliError::SyncIncomplete(failed));
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> String {
    if report.skipped {
        return "Another sync is already running".to_string();
    }
    if report.attempted() == 0 {
        return "Nothing to sync".to_string();
    }
    format!(
        "Synced {} note(s), {} failed; deleted {} note(s), {} failed",
        report.synced, report.failed, report.deleted, report.delete_failed
    )
}
