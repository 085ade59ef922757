//! Permission broker backed by the local filesystem.
//!
//! A file handle reported by the worker is a path on this machine. Read
//! permission is "granted" when the file can be opened for reading.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rwl_core::coordinator::{PermissionBroker, PermissionState};
use rwl_core::message::FileHandleRef;
use std::io::ErrorKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct FsPermissionBroker;

#[async_trait]
impl PermissionBroker for FsPermissionBroker {
    async fn request_read_permission(&self, handle: &FileHandleRef) -> Result<PermissionState> {
        match tokio::fs::File::open(handle.as_str()).await {
            Ok(_) => Ok(PermissionState::Granted),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Ok(PermissionState::Denied),
            Err(e) => Err(e).with_context(|| format!("open {}", handle.as_str())),
        }
    }
}
