//! CLI command handlers, one file per command.

mod cancel;
mod id;
mod load;
mod ping;

use anyhow::{Context, Result};
use rwl_core::channel::WorkerChannel;
use rwl_core::config::LoaderConfig;
use rwl_core::transport::{self, TransportHandle};
use std::path::PathBuf;
use std::sync::Arc;

pub use cancel::run_cancel;
pub use id::run_id;
pub use load::{run_load, LoadArgs};
pub use ping::run_ping;

/// `--socket` if given, else the configured worker socket.
fn socket_path(cfg: &LoaderConfig, socket: Option<PathBuf>) -> Result<PathBuf> {
    match socket {
        Some(path) => Ok(path),
        None => cfg.worker_socket_path(),
    }
}

async fn connect_worker(
    cfg: &LoaderConfig,
    socket: Option<PathBuf>,
    channel: Arc<WorkerChannel>,
) -> Result<TransportHandle> {
    let path = socket_path(cfg, socket)?;
    let policy = cfg.reconnect_policy()?;
    transport::connect(&path, channel, &policy)
        .await
        .with_context(|| format!("is the worker running? ({})", path.display()))
}
