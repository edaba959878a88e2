use crate::commands::common::{
    format_note_lines, note_to_list_item, open_engine, AppContext, NoteListItem,
};
use crate::error::CliError;

pub async fn run_list(
    context: &AppContext,
    search: Option<&str>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let engine = open_engine(context).await?;
    if let Some(term) = search {
        engine.set_search_term(term);
    }

    let mut notes = engine.notes();
    notes.truncate(limit);

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
