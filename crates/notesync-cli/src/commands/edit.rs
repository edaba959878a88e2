use notesync_core::Note;

use crate::commands::common::{
    capture_editor_input_with_initial, describe_save_outcome, find_note, normalize_content,
    normalize_note_identifier, open_engine, AppContext,
};
use crate::error::CliError;

pub async fn run_edit(
    context: &AppContext,
    id: &str,
    title: Option<&str>,
    content_parts: &[String],
) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let engine = open_engine(context).await?;
    let note = find_note(&engine.notes(), &normalized_id)?;

    let content = if let Some(content) = normalize_content(&content_parts.join(" ")) {
        content
    } else if title.is_some() {
        note.content.clone()
    } else {
        capture_editor_input_with_initial(&note.content)?.ok_or(CliError::EmptyEditedContent)?
    };
    let title = title.map_or_else(|| note.title.clone(), |title| title.trim().to_string());

    if title == note.title && content == note.content {
        println!("{}", note.id);
        return Ok(());
    }

    let edited = Note::new(title, content).with_id(note.id);
    let outcome = engine.save_or_update_note(edited).await?;
    println!("{}", describe_save_outcome(&outcome));
    Ok(())
}
