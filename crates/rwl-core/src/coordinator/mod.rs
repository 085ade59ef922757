//! Load coordinator: drives one collection's load through the worker.
//!
//! The coordinator resolves the locator, posts a single `addColl` command,
//! and folds the worker's `collProgress` / `collAdded` notifications into a
//! `LoadSession` that the presentation layer watches. It also owns the
//! keepalive pinger and the retry, permission and cancel commands.
//!
//! Every `start` claims a fresh session ticket from the channel. Listener and
//! keepalive tasks are bound to their ticket, so a restarted (or superseded)
//! session can not be touched by notifications meant for an older one.

mod keepalive;
mod permission;
mod state;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::channel::WorkerChannel;
use crate::error::LoadError;
use crate::message::{WorkerCommand, WorkerNotification};
use crate::platform::Platform;
use crate::source::{
    InteractiveScheme, LoadInfo, Resolution, ResolveContext, SchemeResolver, SourceDescriptor,
    SourceResolver,
};

pub use permission::{NoPermissionPrompt, PermissionBroker, PermissionState};
pub use state::{CollectionLoaded, LoadSession, LoadState};

use state::Applied;

/// Default interval between keepalive pings.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

const EVENT_CAPACITY: usize = 16;

/// Events emitted besides the state snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// The collection finished loading (`collection-loaded`).
    CollectionLoaded(CollectionLoaded),
    /// File-handle support was turned off for the rest of the process.
    FileHandleSupportDisabled,
}

/// Builder for `LoadCoordinator`.
pub struct CoordinatorBuilder {
    collection: String,
    platform: Arc<Platform>,
    channel: Option<Arc<WorkerChannel>>,
    resolver: Arc<dyn SourceResolver>,
    permissions: Arc<dyn PermissionBroker>,
    keepalive_interval: Duration,
    load_info: Option<LoadInfo>,
}

impl CoordinatorBuilder {
    /// Worker channel to load through. Without one every start fails with a
    /// platform error.
    pub fn channel(mut self, channel: Arc<WorkerChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn permission_broker(mut self, broker: Arc<dyn PermissionBroker>) -> Self {
        self.permissions = broker;
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn load_info(mut self, info: LoadInfo) -> Self {
        self.load_info = Some(info);
        self
    }

    pub fn build(self) -> LoadCoordinator {
        let (state, _) = watch::channel(LoadSession::new(self.collection.clone()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut run = Run::default();
        run.load_info = self.load_info;
        LoadCoordinator {
            shared: Arc::new(Shared {
                collection: self.collection,
                channel: self.channel,
                platform: self.platform,
                resolver: self.resolver,
                permissions: self.permissions,
                keepalive_interval: self.keepalive_interval,
                state,
                events,
                run: Mutex::new(run),
            }),
        }
    }
}

/// Handle to one collection's load. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct LoadCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    collection: String,
    channel: Option<Arc<WorkerChannel>>,
    platform: Arc<Platform>,
    resolver: Arc<dyn SourceResolver>,
    permissions: Arc<dyn PermissionBroker>,
    keepalive_interval: Duration,
    state: watch::Sender<LoadSession>,
    events: broadcast::Sender<LoaderEvent>,
    run: Mutex<Run>,
}

/// What the listener does after folding a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Continue,
    Stop,
    /// File-handle support just turned off; reload the same locator.
    Restart,
}

/// Mutable bookkeeping of the current attempt.
#[derive(Default)]
struct Run {
    ticket: u64,
    local_tickets: u64,
    locator: Option<String>,
    load_info: Option<LoadInfo>,
    pending: Option<oneshot::Sender<SourceDescriptor>>,
    listener: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
}

impl Run {
    /// Returns true if a keepalive was running.
    fn stop_keepalive(&mut self) -> bool {
        match self.keepalive.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn stop_listener(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        self.stop_keepalive();
        self.stop_listener();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let (Some(channel), Ok(run)) = (&self.channel, self.run.get_mut()) {
            channel.release_session(&self.collection, run.ticket);
        }
    }
}

impl Shared {
    fn is_current(&self, run: &Run, ticket: u64) -> bool {
        run.ticket == ticket
            && self
                .channel
                .as_ref()
                .map_or(true, |c| c.is_current_session(&self.collection, ticket))
    }

    fn fail(&self, ticket: u64, error: LoadError) {
        let run = self.run.lock().unwrap();
        if !self.is_current(&run, ticket) {
            return;
        }
        tracing::warn!(collection = %self.collection, retry = error.allows_retry(), "load failed: {}", error);
        self.state.send_modify(|s| s.fail(error));
    }

    /// Fold a notification for this collection and tell the listener how to go on.
    fn handle_notification(&self, ticket: u64, notification: &WorkerNotification) -> Next {
        let mut run = self.run.lock().unwrap();
        if !self.is_current(&run, ticket) {
            if run.ticket == ticket && run.stop_keepalive() {
                self.state.send_modify(|s| s.keepalive_active = false);
            }
            return Next::Stop;
        }

        let file_handles = self.platform.file_handles_enabled();
        let mut applied = Applied::Ignored;
        self.state.send_if_modified(|s| {
            applied = s.apply(notification, file_handles);
            applied != Applied::Ignored
        });

        match applied {
            Applied::Ignored | Applied::Progress => {}
            Applied::PermissionNeeded => {
                tracing::info!(collection = %self.collection, "worker needs file permission");
            }
            Applied::Errored { missing_local_file } => {
                tracing::warn!(collection = %self.collection, "worker reported error");
                if missing_local_file && self.platform.file_handles.disable() {
                    tracing::info!("local file missing; file-handle support disabled for this process");
                    let _ = self.events.send(LoaderEvent::FileHandleSupportDisabled);
                    return Next::Restart;
                }
            }
            Applied::Completed(loaded) => {
                run.stop_keepalive();
                // Detach rather than abort: this runs on the listener task itself.
                run.listener.take();
                tracing::info!(collection = %self.collection, "collection loaded");
                let _ = self.events.send(LoaderEvent::CollectionLoaded(loaded));
                return Next::Stop;
            }
        }
        Next::Continue
    }

    /// The listener fell behind the bus and dropped notifications. Whatever
    /// they said is unknown, so the attempt fails and can be retried.
    fn notifications_lost(&self, ticket: u64, skipped: u64) {
        let mut run = self.run.lock().unwrap();
        if !self.is_current(&run, ticket) {
            return;
        }
        run.stop_keepalive();
        run.listener.take();
        tracing::warn!(collection = %self.collection, skipped, "worker notifications lost, failing load");
        self.state.send_modify(|s| {
            s.fail(LoadError::NotificationsLost { skipped });
            s.keepalive_active = false;
        });
    }
}

impl LoadCoordinator {
    pub fn builder(collection: impl Into<String>, platform: Arc<Platform>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            collection: collection.into(),
            platform,
            channel: None,
            resolver: Arc::new(SchemeResolver),
            permissions: Arc::new(NoPermissionPrompt),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            load_info: None,
        }
    }

    pub fn collection(&self) -> &str {
        &self.shared.collection
    }

    pub fn snapshot(&self) -> LoadSession {
        self.shared.state.borrow().clone()
    }

    /// Receiver that is marked changed on every session mutation.
    pub fn subscribe(&self) -> watch::Receiver<LoadSession> {
        self.shared.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<LoaderEvent> {
        self.shared.events.subscribe()
    }

    /// Replace the in-memory descriptor used for `file://` locators and for
    /// `extraConfig` / `newFullImport`. Takes effect on the next start.
    pub fn set_load_info(&self, info: Option<LoadInfo>) {
        self.shared.run.lock().unwrap().load_info = info;
    }

    /// Start loading `locator`. Returns once `addColl` has been handed to the
    /// worker, or as soon as the attempt fails or is superseded. Progress
    /// arrives later through `subscribe`.
    pub async fn start(&self, locator: impl Into<String>) {
        let locator = locator.into();
        let shared = &self.shared;
        let (ticket, load_info) = self.begin(&locator);
        tracing::info!(collection = %shared.collection, ticket, locator = %locator, "starting load");

        let Some(channel) = shared.channel.clone() else {
            let error = if shared.platform.secure_context {
                LoadError::PlatformUnsupported
            } else {
                LoadError::InsecureContext {
                    host: shared.platform.host.clone(),
                }
            };
            shared.fail(ticket, error);
            return;
        };

        let resolution = shared.resolver.resolve(
            &locator,
            &ResolveContext {
                load_info: load_info.as_ref(),
                platform: &shared.platform,
            },
        );
        let mut source = match resolution {
            Ok(Resolution::Ready(source)) => source,
            Ok(Resolution::Passthrough) => SourceDescriptor::passthrough(&locator),
            Ok(Resolution::Rejected(error)) => {
                shared.fail(ticket, error);
                return;
            }
            Ok(Resolution::Interactive(scheme)) => match self.await_interactive(ticket, scheme).await {
                Some(source) => source,
                None => return,
            },
            Err(e) => {
                tracing::warn!(locator = %locator, "source resolution failed, passing locator through: {:#}", e);
                SourceDescriptor::passthrough(&locator)
            }
        };

        source.new_full_import = load_info.as_ref().and_then(|i| i.new_full_import);
        let extra_config = load_info.as_ref().and_then(|i| i.extra_config.clone());

        if !self.enter_started(ticket, &channel) {
            return;
        }

        let cmd = WorkerCommand::add_coll(shared.collection.clone(), source, extra_config);
        loop {
            if !channel.controller_active() {
                tracing::debug!(collection = %shared.collection, "waiting for worker controller");
            }
            channel.wait_for_controller().await;
            let mut run = shared.run.lock().unwrap();
            if !shared.is_current(&run, ticket) {
                return;
            }
            match channel.post(cmd.clone()) {
                Ok(()) => {
                    run.keepalive = Some(keepalive::spawn_keepalive(
                        Arc::clone(&channel),
                        shared.collection.clone(),
                        ticket,
                        shared.keepalive_interval,
                    ));
                    shared.state.send_modify(|s| s.keepalive_active = true);
                    return;
                }
                Err(e) => tracing::debug!("addColl not delivered ({}), waiting for a new controller", e),
            }
        }
    }

    /// Ask the worker to stop loading this collection and stop the keepalive.
    /// The session state is left as is.
    pub fn cancel(&self) {
        let shared = &self.shared;
        let Some(channel) = &shared.channel else {
            return;
        };
        if !channel.controller_active() {
            return;
        }
        let cmd = WorkerCommand::CancelLoad {
            name: shared.collection.clone(),
        };
        if let Err(e) = channel.post(cmd) {
            tracing::debug!(collection = %shared.collection, "cancelLoad not delivered: {}", e);
            return;
        }
        tracing::info!(collection = %shared.collection, "load cancelled");
        if shared.run.lock().unwrap().stop_keepalive() {
            shared.state.send_modify(|s| s.keepalive_active = false);
        }
    }

    /// Start again with the last locator, from a fresh session.
    pub async fn retry(&self) {
        let locator = self.shared.run.lock().unwrap().locator.clone();
        match locator {
            Some(locator) => self.start(locator).await,
            None => tracing::debug!(collection = %self.shared.collection, "retry before any start ignored"),
        }
    }

    /// Reload the last locator if `ticket` is still the current attempt.
    async fn restart(&self, ticket: u64) {
        let locator = {
            let run = self.shared.run.lock().unwrap();
            if run.ticket != ticket {
                return;
            }
            run.locator.clone()
        };
        if let Some(locator) = locator {
            tracing::info!(collection = %self.shared.collection, "reloading without file-handle support");
            self.start(locator).await;
        }
    }

    /// Request read permission on the handle the worker reported and restart
    /// on success. Returns whether permission was granted.
    pub async fn grant_permission(&self) -> bool {
        let handle = {
            let session = self.shared.state.borrow();
            if session.state != LoadState::PermissionNeeded {
                return false;
            }
            session.file_handle.clone()
        };
        let Some(handle) = handle else {
            return false;
        };

        match self.shared.permissions.request_read_permission(&handle).await {
            Ok(PermissionState::Granted) => {
                tracing::info!(handle = handle.as_str(), "file permission granted");
                self.retry().await;
                true
            }
            Ok(state) => {
                tracing::info!(handle = handle.as_str(), ?state, "file permission not granted");
                false
            }
            Err(e) => {
                tracing::warn!(handle = handle.as_str(), "permission request failed: {:#}", e);
                false
            }
        }
    }

    /// Fulfil a pending interactive resolution. Returns false if none is pending.
    pub fn submit_interactive_result(&self, source: SourceDescriptor) -> bool {
        let pending = self.shared.run.lock().unwrap().pending.take();
        match pending {
            Some(tx) => tx.send(source).is_ok(),
            None => false,
        }
    }

    /// Claim a new ticket and reset the session for `locator`.
    fn begin(&self, locator: &str) -> (u64, Option<LoadInfo>) {
        let shared = &self.shared;
        let mut run = shared.run.lock().unwrap();
        run.stop_keepalive();
        run.stop_listener();
        run.pending = None;

        let ticket = match &shared.channel {
            Some(channel) => channel.claim_session(&shared.collection),
            None => {
                run.local_tickets += 1;
                run.local_tickets
            }
        };
        run.ticket = ticket;
        run.locator = Some(locator.to_string());
        shared.state.send_modify(|s| s.reset_for(locator, ticket));
        (ticket, run.load_info.clone())
    }

    async fn await_interactive(&self, ticket: u64, scheme: InteractiveScheme) -> Option<SourceDescriptor> {
        let shared = &self.shared;
        let rx = {
            let mut run = shared.run.lock().unwrap();
            if !shared.is_current(&run, ticket) {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            run.pending = Some(tx);
            shared.state.send_modify(|s| {
                s.state = LoadState::Resolving(scheme);
                s.awaiting_interactive = true;
            });
            rx
        };
        tracing::info!(collection = %shared.collection, ?scheme, "waiting for interactive resolution");
        // A dropped sender means a newer start replaced this one.
        rx.await.ok()
    }

    /// Enter `Started` and bind a listener to `ticket`. The listener
    /// subscribes before `addColl` goes out so no notification is missed.
    fn enter_started(&self, ticket: u64, channel: &WorkerChannel) -> bool {
        let shared = &self.shared;
        let mut run = shared.run.lock().unwrap();
        if !shared.is_current(&run, ticket) {
            return false;
        }
        run.stop_listener();
        run.listener = Some(spawn_listener(
            Arc::downgrade(&self.shared),
            channel.subscribe(),
            shared.collection.clone(),
            ticket,
        ));
        shared.state.send_modify(|s| {
            s.state = LoadState::Started;
            s.awaiting_interactive = false;
        });
        true
    }
}

fn spawn_listener(
    shared: Weak<Shared>,
    mut rx: broadcast::Receiver<WorkerNotification>,
    collection: String,
    ticket: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    if notification.collection() != Some(collection.as_str()) {
                        continue;
                    }
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    match shared.handle_notification(ticket, &notification) {
                        Next::Continue => {}
                        Next::Stop => break,
                        Next::Restart => {
                            let coordinator = LoadCoordinator { shared };
                            tokio::spawn(async move { coordinator.restart(ticket).await });
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(collection = %collection, skipped, "notification listener lagged");
                    if let Some(shared) = shared.upgrade() {
                        shared.notifications_lost(ticket, skipped);
                    }
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
