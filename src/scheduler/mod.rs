//! Background scheduler fanning out periodic sync runs.

use chrono::{NaiveDateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::connections::{ConnectionRepository, ConnectionStatus, SyncError, SyncFrequency};
use crate::constants::{DEFAULT_SCHEDULER_INTERVAL_SECS, ENV_SCHEDULER_INTERVAL};
use crate::sync::SyncHandle;

/// Initial delay before the first scan, letting the host finish startup
const INITIAL_DELAY_SECS: u64 = 60;

fn scheduler_interval() -> Duration {
    let secs = std::env::var(ENV_SCHEDULER_INTERVAL)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_SCHEDULER_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Decides whether a connection is due for a scheduled sync.
/// `manual` connections are never scheduled; `hourly`/`daily` become due
/// once their window since the last sync has passed.
pub fn is_due(
    frequency: SyncFrequency,
    last_sync_at: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> bool {
    let window_secs = match frequency {
        SyncFrequency::Manual => return false,
        SyncFrequency::Hourly => 60 * 60,
        SyncFrequency::Daily => 24 * 60 * 60,
    };

    match last_sync_at {
        None => true,
        Some(last) => (now - last).num_seconds() > window_secs,
    }
}

fn eligible_status(status: ConnectionStatus) -> bool {
    // Disconnected connections need a fresh login; a run in flight keeps
    // its lease and rejects the submission anyway.
    matches!(
        status,
        ConnectionStatus::Connected | ConnectionStatus::Error
    )
}

/// Periodic trigger scanning for connections whose sync window has lapsed
pub struct SyncScheduler {
    connections: Arc<ConnectionRepository>,
    sync_handle: SyncHandle,
}

impl SyncScheduler {
    pub fn new(connections: Arc<ConnectionRepository>, sync_handle: SyncHandle) -> Self {
        Self {
            connections,
            sync_handle,
        }
    }

    /// Spawns the scheduler loop. The loop logs failures and never takes
    /// the process down.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Sync scheduler started (interval {:?})",
                scheduler_interval()
            );

            tokio::time::sleep(Duration::from_secs(INITIAL_DELAY_SECS)).await;

            let mut tick = interval(scheduler_interval());
            loop {
                tick.tick().await;
                self.run_once();
            }
        })
    }

    /// A single scheduler scan; separated from the loop for tests
    pub fn run_once(&self) {
        let connections = match self.connections.list_all() {
            Ok(connections) => connections,
            Err(err) => {
                warn!("Scheduler failed to list connections: {}", err);
                return;
            }
        };

        let now = Utc::now().naive_utc();
        for connection in connections {
            if !eligible_status(connection.status) {
                continue;
            }
            if !is_due(connection.sync_frequency, connection.last_sync_at, now) {
                continue;
            }

            match self.sync_handle.submit(&connection.id) {
                Ok(()) => debug!("Scheduled sync for connection {}", connection.id),
                Err(SyncError::AlreadyRunning) => {
                    debug!("Connection {} already syncing, skipping", connection.id)
                }
                Err(err) => warn!(
                    "Failed to schedule sync for connection {}: {}",
                    connection.id, err
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn at(now: NaiveDateTime, hours_ago: i64) -> Option<NaiveDateTime> {
        Some(now - ChronoDuration::hours(hours_ago))
    }

    #[test]
    fn manual_is_never_due() {
        let now = Utc::now().naive_utc();
        assert!(!is_due(SyncFrequency::Manual, None, now));
        assert!(!is_due(SyncFrequency::Manual, at(now, 100), now));
    }

    #[test]
    fn hourly_due_after_an_hour() {
        let now = Utc::now().naive_utc();
        assert!(!is_due(SyncFrequency::Hourly, at(now, 0), now));
        assert!(is_due(SyncFrequency::Hourly, at(now, 2), now));
    }

    #[test]
    fn daily_due_after_a_day() {
        let now = Utc::now().naive_utc();
        assert!(!is_due(SyncFrequency::Daily, at(now, 23), now));
        assert!(is_due(SyncFrequency::Daily, at(now, 25), now));
    }

    #[test]
    fn never_synced_connections_are_due() {
        let now = Utc::now().naive_utc();
        assert!(is_due(SyncFrequency::Hourly, None, now));
        assert!(is_due(SyncFrequency::Daily, None, now));
    }

    #[test]
    fn only_settled_states_are_eligible() {
        assert!(eligible_status(ConnectionStatus::Connected));
        assert!(eligible_status(ConnectionStatus::Error));
        assert!(!eligible_status(ConnectionStatus::Disconnected));
        assert!(!eligible_status(ConnectionStatus::Syncing));
        assert!(!eligible_status(ConnectionStatus::AwaitingOtp));
        assert!(!eligible_status(ConnectionStatus::New));
    }
}
