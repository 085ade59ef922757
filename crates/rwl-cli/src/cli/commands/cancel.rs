//! `rwl cancel` – ask the worker to stop loading a collection.

use anyhow::Result;
use rwl_core::channel::WorkerChannel;
use rwl_core::config::LoaderConfig;
use rwl_core::message::WorkerCommand;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run_cancel(cfg: &LoaderConfig, name: &str, socket: Option<PathBuf>) -> Result<()> {
    let channel = Arc::new(WorkerChannel::default());
    let handle = super::connect_worker(cfg, socket, Arc::clone(&channel)).await?;
    channel.post(WorkerCommand::CancelLoad {
        name: name.to_string(),
    })?;
    handle.close().await;
    tracing::info!(collection = name, "cancelLoad sent");
    println!("Cancel requested for {}", name);
    Ok(())
}
