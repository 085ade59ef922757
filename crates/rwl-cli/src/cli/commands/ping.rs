//! `rwl ping` – send one keepalive ping.

use anyhow::Result;
use rwl_core::channel::WorkerChannel;
use rwl_core::config::LoaderConfig;
use rwl_core::message::WorkerCommand;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run_ping(cfg: &LoaderConfig, socket: Option<PathBuf>) -> Result<()> {
    let channel = Arc::new(WorkerChannel::default());
    let handle = super::connect_worker(cfg, socket, Arc::clone(&channel)).await?;
    channel.post(WorkerCommand::Ping)?;
    handle.close().await;
    println!("Ping sent.");
    Ok(())
}
