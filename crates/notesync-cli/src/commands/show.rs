use crate::commands::common::{
    find_note, format_timestamp, normalize_note_identifier, note_to_list_item, open_engine,
    AppContext,
};
use crate::error::CliError;

pub async fn run_show(context: &AppContext, id: &str, as_json: bool) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let engine = open_engine(context).await?;
    let note = find_note(&engine.notes(), &normalized_id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note_to_list_item(&note))?);
        return Ok(());
    }

    println!("id:      {}", note.id);
    println!("status:  {}", note.sync_status);
    println!("updated: {}", format_timestamp(note.updated_at));
    if !note.title.is_empty() {
        println!("title:   {}", note.title);
    }
    println!();
    println!("{}", note.content);
    Ok(())
}
