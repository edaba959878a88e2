use std::sync::Arc;

use notesync_core::sync::RetryBackoff;
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{describe_event, open_engine, AppContext};
use crate::commands::sync::format_sync_report;
use crate::error::CliError;

pub async fn run_watch(context: &AppContext) -> Result<(), CliError> {
    let engine = Arc::new(open_engine(context).await?);
    let mut events = engine.subscribe_events();

    let reconnect = engine.spawn_reconnect_listener();
    let retry = engine.spawn_retry_loop(RetryBackoff::from_config(&context.config));
    let probe = (!context.offline).then(|| {
        engine.connectivity().spawn_probe(
            Arc::clone(engine.remote()),
            context.config.probe_interval(),
            context.config.request_timeout(),
        )
    });

    if engine.is_online() {
        let report = engine.sync_offline_notes().await?;
        println!("{}", format_sync_report(&report));
    } else {
        println!("Offline, waiting for the server to become reachable");
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = describe_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Dropped {skipped} sync events");
                }
                Err(RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    reconnect.abort();
    retry.abort();
    if let Some(probe) = probe {
        probe.abort();
    }
    Ok(())
}
