//! Seam to the platform's permission prompt for local file handles.

use anyhow::Result;
use async_trait::async_trait;

use crate::message::FileHandleRef;

/// Result of a permission request, mirroring the platform's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// The user dismissed the prompt without answering.
    Prompt,
}

/// Asks the platform for read access to a file handle the worker could not open.
#[async_trait]
pub trait PermissionBroker: Send + Sync {
    async fn request_read_permission(&self, handle: &FileHandleRef) -> Result<PermissionState>;
}

/// Broker for platforms without a permission prompt: always denies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPermissionPrompt;

#[async_trait]
impl PermissionBroker for NoPermissionPrompt {
    async fn request_read_permission(&self, _handle: &FileHandleRef) -> Result<PermissionState> {
        Ok(PermissionState::Denied)
    }
}
