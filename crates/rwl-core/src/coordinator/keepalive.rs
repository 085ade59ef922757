//! Periodic no-op pings that keep the worker from being reclaimed mid-load.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::channel::WorkerChannel;
use crate::message::WorkerCommand;

/// Spawns the keepalive loop for one session. The first ping goes out one
/// `period` after spawning. The loop ends on its own once `ticket` no longer
/// holds the session for `collection`; otherwise abort the handle to stop it.
pub(super) fn spawn_keepalive(
    channel: Arc<WorkerChannel>,
    collection: String,
    ticket: u64,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !channel.is_current_session(&collection, ticket) {
                tracing::debug!(collection = %collection, ticket, "keepalive stopped: session superseded");
                break;
            }
            if let Err(e) = channel.post(WorkerCommand::Ping) {
                tracing::debug!(collection = %collection, "keepalive ping skipped: {}", e);
            }
        }
    })
}
