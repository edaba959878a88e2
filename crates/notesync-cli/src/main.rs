//! notesync CLI - offline-first notes from the terminal
//!
//! Every change is queued locally first and replayed against the remote
//! note service whenever it is reachable.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use notesync_core::config::ClientConfig;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::AppContext;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "notesync=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = AppContext::new(ClientConfig::load()?, cli.db_path, cli.offline)?;

    match cli.command {
        Commands::Add { title, content } => run_add(&context, &title, &content).await?,
        Commands::Edit { id, title, content } => {
            run_edit(&context, &id, title.as_deref(), &content).await?;
        }
        Commands::Delete { id } => run_delete(&context, &id).await?,
        Commands::List {
            search,
            limit,
            json,
        } => run_list(&context, search.as_deref(), limit, json).await?,
        Commands::Show { id, json } => run_show(&context, &id, json).await?,
        Commands::Sync => run_sync(&context).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Watch => run_watch(&context).await?,
        Commands::Config { command } => run_config(command, &context)?,
    }

    Ok(())
}
