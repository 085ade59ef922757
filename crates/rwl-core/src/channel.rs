//! Process-wide channel to the single background worker.
//!
//! One `WorkerChannel` is shared by every coordinator in the process. It holds
//! the current controller (the command sink into the worker, installed by a
//! transport once connected), a broadcast bus that delivers every worker
//! notification to every listener, and the registry of live load sessions
//! keyed by collection name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::{broadcast, mpsc, watch};

use crate::error::ChannelError;
use crate::message::{WorkerCommand, WorkerNotification};

/// Default capacity of the notification bus.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Command sink of the currently connected worker.
#[derive(Debug, Clone)]
struct Controller {
    id: u64,
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

#[derive(Debug)]
pub struct WorkerChannel {
    controller: watch::Sender<Option<Controller>>,
    notifications: broadcast::Sender<WorkerNotification>,
    sessions: Mutex<HashMap<String, u64>>,
    next_id: AtomicU64,
}

impl Default for WorkerChannel {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl WorkerChannel {
    pub fn new(capacity: usize) -> Self {
        let (controller, _) = watch::channel(None);
        let (notifications, _) = broadcast::channel(capacity.max(1));
        Self {
            controller,
            notifications,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Install `tx` as the active controller. Returns an id for `clear_controller`.
    pub fn install_controller(&self, tx: mpsc::UnboundedSender<WorkerCommand>) -> u64 {
        let id = self.fresh_id();
        self.controller.send_replace(Some(Controller { id, tx }));
        tracing::debug!(controller = id, "worker controller active");
        id
    }

    /// Remove the controller installed under `id`; a newer controller is left alone.
    pub fn clear_controller(&self, id: u64) {
        let cleared = self.controller.send_if_modified(|current| match current {
            Some(c) if c.id == id => {
                *current = None;
                true
            }
            _ => false,
        });
        if cleared {
            tracing::debug!(controller = id, "worker controller cleared");
        }
    }

    pub fn controller_active(&self) -> bool {
        self.controller
            .borrow()
            .as_ref()
            .is_some_and(|c| !c.tx.is_closed())
    }

    /// Resolves once a controller is active (immediately if one already is).
    pub async fn wait_for_controller(&self) {
        let mut rx = self.controller.subscribe();
        // The sender lives in `self`, so the receiver can not observe a closed channel.
        let _ = rx
            .wait_for(|c| c.as_ref().is_some_and(|c| !c.tx.is_closed()))
            .await;
    }

    /// Fire-and-forget send to the worker.
    pub fn post(&self, cmd: WorkerCommand) -> Result<(), ChannelError> {
        let guard = self.controller.borrow();
        let controller = guard.as_ref().ok_or(ChannelError::NoController)?;
        tracing::trace!(msg_type = cmd.msg_type(), "post to worker");
        controller.tx.send(cmd).map_err(|_| ChannelError::Disconnected)
    }

    /// Deliver a notification to every current listener.
    pub fn publish(&self, notification: WorkerNotification) {
        // No listeners is fine: nobody is loading anything.
        let _ = self.notifications.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerNotification> {
        self.notifications.subscribe()
    }

    /// Claim the session for `collection`, superseding any previous claim.
    /// Returns the session ticket.
    pub fn claim_session(&self, collection: &str) -> u64 {
        let ticket = self.fresh_id();
        let previous = self
            .sessions
            .lock()
            .unwrap()
            .insert(collection.to_string(), ticket);
        if let Some(previous) = previous {
            tracing::debug!(collection, previous, ticket, "load session superseded");
        }
        ticket
    }

    /// True while `ticket` is the latest claim for `collection`.
    pub fn is_current_session(&self, collection: &str, ticket: u64) -> bool {
        self.sessions.lock().unwrap().get(collection) == Some(&ticket)
    }

    /// Drop the claim if `ticket` still holds it.
    pub fn release_session(&self, collection: &str, ticket: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.get(collection) == Some(&ticket) {
            sessions.remove(collection);
        }
    }
}
