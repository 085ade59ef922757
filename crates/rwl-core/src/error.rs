//! Error types surfaced through load sessions and the worker channel.

/// Worker error code for an archive whose local file is gone.
pub const MISSING_LOCAL_FILE: &str = "missing_local_file";

/// Worker error code for a local file whose read permission must be re-granted.
pub const PERMISSION_NEEDED: &str = "permission_needed";

/// Why a load attempt failed or stalled.
///
/// Worker-originated errors are never returned from coordinator commands; they
/// are recorded on the session snapshot for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// A worker channel exists only in secure contexts and this one is not.
    #[error(
        "the loader must be served from an HTTPS URL, but was loaded from: {host}.\n\
         Please try loading it from an HTTPS URL"
    )]
    InsecureContext { host: String },
    /// No background worker is available on this platform.
    #[error("this platform is not supported: no background worker is available")]
    PlatformUnsupported,
    /// The locator can not be loaded as entered (e.g. a bare `file://` URL).
    #[error(
        "file URLs can not be entered directly or shared: {locator}\n\
         Select a local file to load it instead"
    )]
    LocatorRejected { locator: String },
    /// Any other error code reported by the worker, shown verbatim.
    #[error("{code}")]
    WorkerReported { code: String },
    /// The listener fell behind and worker notifications for this load were dropped.
    #[error("lost {skipped} worker notifications while loading; retry to reload")]
    NotificationsLost { skipped: u64 },
    #[error("{}", MISSING_LOCAL_FILE)]
    MissingLocalFile,
    #[error("{}", PERMISSION_NEEDED)]
    PermissionNeeded,
}

impl LoadError {
    /// Maps an error code from a `collProgress` notification.
    pub fn from_worker_code(code: &str) -> Self {
        match code {
            MISSING_LOCAL_FILE => LoadError::MissingLocalFile,
            PERMISSION_NEEDED => LoadError::PermissionNeeded,
            other => LoadError::WorkerReported {
                code: other.to_string(),
            },
        }
    }

    /// Whether the presentation layer should offer a retry action.
    pub fn allows_retry(&self) -> bool {
        !matches!(
            self,
            LoadError::InsecureContext { .. }
                | LoadError::PlatformUnsupported
                | LoadError::LocatorRejected { .. }
        )
    }
}

/// Failure to hand a command to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// No controller is active (worker not connected yet).
    #[error("no active worker controller")]
    NoController,
    /// The controller went away while sending.
    #[error("worker controller disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_codes_map_to_variants() {
        assert_eq!(
            LoadError::from_worker_code("missing_local_file"),
            LoadError::MissingLocalFile
        );
        assert_eq!(
            LoadError::from_worker_code("permission_needed"),
            LoadError::PermissionNeeded
        );
        assert_eq!(
            LoadError::from_worker_code("Invalid archive"),
            LoadError::WorkerReported {
                code: "Invalid archive".to_string()
            }
        );
    }

    #[test]
    fn worker_messages_are_verbatim() {
        let err = LoadError::from_worker_code("Sorry, this archive could not be read");
        assert_eq!(err.to_string(), "Sorry, this archive could not be read");
        assert_eq!(LoadError::MissingLocalFile.to_string(), "missing_local_file");
    }

    #[test]
    fn platform_and_locator_errors_are_not_retryable() {
        assert!(!LoadError::PlatformUnsupported.allows_retry());
        assert!(!LoadError::InsecureContext {
            host: "example.com".into()
        }
        .allows_retry());
        assert!(!LoadError::LocatorRejected {
            locator: "file://x.wacz".into()
        }
        .allows_retry());
        assert!(LoadError::MissingLocalFile.allows_retry());
        assert!(LoadError::WorkerReported { code: "x".into() }.allows_retry());
        assert!(LoadError::NotificationsLost { skipped: 3 }.allows_retry());
    }
}
