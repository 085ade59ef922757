//! Host platform capabilities shared by every coordinator in the process.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::LoaderConfig;

/// Whether the platform can reopen local files through a file-handle flow.
///
/// Starts enabled or disabled from config. Once disabled (after the worker
/// reports a missing local file) it stays disabled until the process exits;
/// there is no way to turn it back on.
#[derive(Debug)]
pub struct FileHandleSupport {
    enabled: AtomicBool,
}

impl FileHandleSupport {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Disables support. Returns true if this call flipped the flag.
    pub fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }
}

/// Description of the environment the loader runs in.
#[derive(Debug)]
pub struct Platform {
    /// Worker channels are only available in secure contexts.
    pub secure_context: bool,
    /// Running as a packaged desktop application (enables `ipfs://`).
    pub packaged_app: bool,
    /// Host name used in platform error messages.
    pub host: String,
    /// Local file-serving prefix of the packaged app, used for proxy URLs.
    pub file_serve_prefix: Option<String>,
    pub file_handles: FileHandleSupport,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            secure_context: true,
            packaged_app: false,
            host: "localhost".to_string(),
            file_serve_prefix: None,
            file_handles: FileHandleSupport::new(true),
        }
    }
}

impl Platform {
    pub fn from_config(cfg: &LoaderConfig) -> Self {
        Self {
            secure_context: cfg.secure_context,
            packaged_app: cfg.packaged_app,
            host: cfg.host.clone(),
            file_serve_prefix: cfg.file_serve_prefix.clone(),
            file_handles: FileHandleSupport::new(cfg.file_handles),
        }
    }

    pub fn file_handles_enabled(&self) -> bool {
        self.file_handles.is_enabled()
    }
}
