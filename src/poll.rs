//! Background refresh sweep.
//!
//! The dashboard shell refreshes its view on a timer; the server side
//! counterpart is a periodic sweep that revalidates every registered
//! source and records a [`StatusSnapshot`] for `GET /api/status`:
//!
//! - `connected` — the last sweep succeeded and at least one source is
//!   healthy
//! - `error` — the sweep failed, or every source is broken
//! - `disconnected` — no sweep has completed yet, or no sources exist

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::model::{ConnectionStatus, StatusSnapshot};
use crate::registry::RegistryHandle;

/// Shared, handler-readable snapshot of the latest sweep.
pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

pub fn shared_status() -> SharedStatus {
    Arc::new(RwLock::new(StatusSnapshot::default()))
}

/// Run one sweep: revalidate the registry and derive a status.
pub async fn sweep(registry: &RegistryHandle) -> StatusSnapshot {
    let status = match registry.call(|r| r.validate()).await {
        Ok(sources) if sources.is_empty() => ConnectionStatus::Disconnected,
        Ok(sources) => {
            if sources.iter().any(|s| s.has_error != Some(true)) {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Error
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "refresh sweep failed");
            ConnectionStatus::Error
        }
    };
    StatusSnapshot {
        status,
        last_update: Some(Utc::now()),
    }
}

/// Spawn the periodic sweep task. The first sweep runs immediately.
pub fn spawn_poller(
    registry: RegistryHandle,
    shared: SharedStatus,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = sweep(&registry).await;
            tracing::debug!(status = ?snapshot.status, "refresh sweep completed");
            *shared.write().await = snapshot;
        }
    })
}
