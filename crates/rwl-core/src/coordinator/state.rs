//! Load session snapshot and how worker notifications fold into it.

use serde_json::{Map, Value};

use crate::error::LoadError;
use crate::message::{CollProgress, FileHandleRef, WorkerNotification};
use crate::source::InteractiveScheme;

/// Where a load attempt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing started yet, or a new attempt is being set up.
    #[default]
    Waiting,
    /// Waiting for an interactive step to supply the source descriptor.
    Resolving(InteractiveScheme),
    Started,
    /// The worker needs read permission on a local file before it can continue.
    PermissionNeeded,
    Errored,
    /// Terminal.
    Completed,
}

impl LoadState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Waiting => "waiting",
            LoadState::Resolving(InteractiveScheme::GoogleDrive) => "googledrive",
            LoadState::Started => "started",
            LoadState::PermissionNeeded => "permission_needed",
            LoadState::Errored => "errored",
            LoadState::Completed => "completed",
        }
    }
}

/// Snapshot of one collection's load, published on every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadSession {
    pub collection_name: String,
    pub source_locator: String,
    pub state: LoadState,
    /// Coarse progress in [0, 100].
    pub percent: u8,
    /// Bytes loaded so far; 0 when unknown.
    pub current_size: u64,
    /// Total bytes; 0 when unknown.
    pub total_size: u64,
    pub error: Option<LoadError>,
    pub error_allow_retry: bool,
    /// Handle the worker needs permission for (not owned here).
    pub file_handle: Option<FileHandleRef>,
    /// An interactive resolution slot is waiting to be fulfilled.
    pub awaiting_interactive: bool,
    pub keepalive_active: bool,
    /// Session ticket of the current attempt.
    pub generation: u64,
}

/// Payload of the `collection-loaded` event.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionLoaded {
    pub name: String,
    pub payload: Map<String, Value>,
}

/// What a notification did to the session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Applied {
    Ignored,
    Progress,
    Errored { missing_local_file: bool },
    PermissionNeeded,
    Completed(CollectionLoaded),
}

impl LoadSession {
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            ..Default::default()
        }
    }

    /// Byte progress, present only when both counts are known.
    pub fn byte_progress(&self) -> Option<(u64, u64)> {
        (self.current_size > 0 && self.total_size > 0).then_some((self.current_size, self.total_size))
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn is_terminal(&self) -> bool {
        self.state == LoadState::Completed
    }

    /// Clear everything a new attempt must not inherit.
    pub(crate) fn reset_for(&mut self, locator: &str, generation: u64) {
        self.source_locator = locator.to_string();
        self.state = LoadState::Waiting;
        self.percent = 0;
        self.current_size = 0;
        self.total_size = 0;
        self.error = None;
        self.error_allow_retry = false;
        self.file_handle = None;
        self.awaiting_interactive = false;
        self.keepalive_active = false;
        self.generation = generation;
    }

    pub(crate) fn fail(&mut self, error: LoadError) {
        self.state = LoadState::Errored;
        self.error_allow_retry = error.allows_retry();
        self.error = Some(error);
        self.awaiting_interactive = false;
    }

    /// Fold one worker notification into the session.
    ///
    /// `file_handles_enabled` gates the permission-needed transition; without
    /// file-handle support a permission error is an ordinary error.
    pub(crate) fn apply(&mut self, notification: &WorkerNotification, file_handles_enabled: bool) -> Applied {
        if self.is_terminal() {
            return Applied::Ignored;
        }
        match notification {
            WorkerNotification::CollProgress(p) if p.name == self.collection_name => {
                self.apply_progress(p, file_handles_enabled)
            }
            WorkerNotification::CollAdded { name, payload } if *name == self.collection_name => {
                self.percent = 100;
                if self.total_size > 0 {
                    self.current_size = self.total_size;
                }
                self.state = LoadState::Completed;
                self.keepalive_active = false;
                Applied::Completed(CollectionLoaded {
                    name: name.clone(),
                    payload: payload.clone(),
                })
            }
            _ => Applied::Ignored,
        }
    }

    fn apply_progress(&mut self, p: &CollProgress, file_handles_enabled: bool) -> Applied {
        self.percent = self.percent.max(clamp_percent(p.percent));
        if let (Some(current), Some(total)) = (p.current_size, p.total_size) {
            if current > 0 && total > 0 {
                self.total_size = total;
                self.current_size = current.min(total);
            }
        }

        let Some(code) = p.error.as_deref() else {
            return Applied::Progress;
        };
        let error = LoadError::from_worker_code(code);
        self.file_handle = p.file_handle.clone();
        self.error_allow_retry = true;

        if error == LoadError::PermissionNeeded && p.file_handle.is_some() && file_handles_enabled {
            self.state = LoadState::PermissionNeeded;
            self.error = Some(error);
            return Applied::PermissionNeeded;
        }

        let missing_local_file = error == LoadError::MissingLocalFile;
        self.state = LoadState::Errored;
        self.error = Some(error);
        Applied::Errored { missing_local_file }
    }
}

fn clamp_percent(percent: f64) -> u8 {
    if percent.is_finite() {
        percent.floor().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}
