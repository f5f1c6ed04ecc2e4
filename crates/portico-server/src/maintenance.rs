//! Periodic housekeeping: idle session expiry and cached file cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use portico_core::now_millis;
use portico_store::Store;

use crate::assets::FileRegistry;

/// What one maintenance pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub sessions: usize,
    pub files: usize,
}

/// Session and file expiry.
#[derive(Clone)]
pub struct Maintenance {
    store: Arc<dyn Store>,
    files: Arc<FileRegistry>,
    idle_ttl: Duration,
}

impl Maintenance {
    pub fn new(store: Arc<dyn Store>, files: Arc<FileRegistry>, idle_ttl: Duration) -> Self {
        Self {
            store,
            files,
            idle_ttl,
        }
    }

    /// One pass at time `now` (ms). Failures are logged, never returned.
    pub async fn run_once(&self, now: i64) -> Sweep {
        let cutoff = now.saturating_sub(i64::try_from(self.idle_ttl.as_millis()).unwrap_or(i64::MAX));
        let sessions = match self.store.expire_sessions(cutoff).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "session expiry failed");
                0
            }
        };
        let files = self.files.sweep_expired(now);

        if sessions > 0 || files > 0 {
            tracing::info!(sessions, files, "maintenance sweep");
        }
        Sweep { sessions, files }
    }

    /// Run a pass every `interval` until the runtime shuts down.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once(now_millis()).await;
            }
        })
    }
}
