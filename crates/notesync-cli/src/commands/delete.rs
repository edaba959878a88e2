use notesync_core::DeleteOutcome;

use crate::commands::common::{find_note, normalize_note_identifier, open_engine, AppContext};
use crate::error::CliError;

pub async fn run_delete(context: &AppContext, id: &str) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let engine = open_engine(context).await?;
    let note = find_note(&engine.notes(), &normalized_id)?;

    match engine.delete_note(&note.id).await? {
        DeleteOutcome::Deleted | DeleteOutcome::LocalOnly => println!("{}", note.id),
        DeleteOutcome::Deferred => {
            println!("{} (delete queued, will sync when reachable)", note.id);
        }
    }
    Ok(())
}
