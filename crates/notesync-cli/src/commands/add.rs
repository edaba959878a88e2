use notesync_core::Note;

use crate::commands::common::{describe_save_outcome, open_engine, resolve_note_content, AppContext};
use crate::error::CliError;

pub async fn run_add(
    context: &AppContext,
    title: &str,
    content_parts: &[String],
) -> Result<(), CliError> {
    let title = title.trim();
    let content = resolve_note_content(content_parts, !title.is_empty())?;

    let engine = open_engine(context).await?;
    let outcome = engine.save_or_update_note(Note::new(title, content)).await?;

    println!("{}", describe_save_outcome(&outcome));
    Ok(())
}
