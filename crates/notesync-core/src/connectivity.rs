//! Connectivity tracking.
//!
//! Holds the current reachability in a watch channel so any number of tasks
//! can await transitions. Only real transitions are published.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::remote::RemoteNoteService;

/// A reachability transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityChange {
    CameOnline,
    WentOffline,
}

#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Publish the latest reachability reading.
    ///
    /// Returns the transition, or `None` when the state did not change.
    pub fn set_reachable(&self, reachable: bool) -> Option<ConnectivityChange> {
        let changed = self.state.send_if_modified(|online| {
            if *online == reachable {
                false
            } else {
                *online = reachable;
                true
            }
        });

        if !changed {
            return None;
        }
        let change = if reachable {
            ConnectivityChange::CameOnline
        } else {
            ConnectivityChange::WentOffline
        };
        tracing::info!("Connectivity changed: {change:?}");
        Some(change)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Probe the remote service every `interval` and publish the result.
    ///
    /// Stands in for a platform reachability signal. Each probe is bounded by
    /// `timeout`; a timeout counts as unreachable.
    pub fn spawn_probe<R>(&self, remote: Arc<R>, interval: Duration, timeout: Duration) -> JoinHandle<()>
    where
        R: RemoteNoteService + ?Sized + 'static,
    {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable = probe_once(remote.as_ref(), timeout).await;
                monitor.set_reachable(reachable);
            }
        })
    }
}

/// One bounded reachability check against the remote service
pub async fn probe_once<R>(remote: &R, timeout: Duration) -> bool
where
    R: RemoteNoteService + ?Sized,
{
    match tokio::time::timeout(timeout, remote.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            tracing::debug!("Connectivity probe failed: {error}");
            false
        }
        Err(_) => {
            tracing::debug!("Connectivity probe timed out after {timeout:?}");
            false
        }
    }
}
