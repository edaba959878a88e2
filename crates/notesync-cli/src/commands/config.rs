use std::path::{Path, PathBuf};

use notesync_core::config::{default_config_path, normalize_base_url, ClientConfig};

use crate::cli::ConfigCommands;
use crate::commands::common::AppContext;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, context: &AppContext) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(context),
        ConfigCommands::Init {
            api_url,
            db_path,
            request_timeout,
            probe_interval,
        } => {
            let path = default_config_path()?;
            let config = run_config_init(
                &path,
                ConfigUpdate {
                    api_url,
                    db_path,
                    request_timeout,
                    probe_interval,
                },
            )?;
            println!("Saved config to {}", path.display());
            if let Some(url) = config.api_base_url {
                println!("Remote API: {url}");
            }
            Ok(())
        }
    }
}

fn run_config_show(context: &AppContext) -> Result<(), CliError> {
    let mut effective = context.config.clone();
    effective.db_path = Some(context.db_path.clone());
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}

/// Fields `config init` may change; `None` keeps the current value
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub api_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub request_timeout: Option<u64>,
    pub probe_interval: Option<u64>,
}

pub fn run_config_init(path: &Path, update: ConfigUpdate) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::load_from_path(path)?;

    if let Some(url) = update.api_url {
        config.api_base_url = Some(normalize_base_url(&url)?);
    }
    if let Some(db_path) = update.db_path {
        config.db_path = Some(db_path);
    }
    if let Some(secs) = update.request_timeout {
        if secs == 0 {
            return Err(CliError::Config("request timeout must be at least 1 second".into()));
        }
        config.request_timeout_secs = secs;
    }
    if let Some(secs) = update.probe_interval {
        if secs == 0 {
            return Err(CliError::Config("probe interval must be at least 1 second".into()));
        }
        config.probe_interval_secs = secs;
    }

    config.save_to_path(path)?;
    Ok(config)
}
