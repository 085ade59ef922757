//! Unix-socket transport between a `WorkerChannel` and the worker process.
//!
//! Protocol: one JSON object per line in each direction. Commands go out as
//! `WorkerCommand`, notifications come back as `WorkerNotification`.

mod policy;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::WorkerChannel;
use crate::message::{WorkerCommand, WorkerNotification};

pub use policy::{classify_io_error, ErrorKind, ReconnectPolicy, RetryDecision};

/// Running transport. Dropping it leaves the tasks running; call `shutdown`
/// to tear the connection down.
#[derive(Debug)]
pub struct TransportHandle {
    channel: Arc<WorkerChannel>,
    controller_id: u64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl TransportHandle {
    /// Abort both tasks and clear the controller.
    pub fn shutdown(self) {
        self.reader.abort();
        self.writer.abort();
        self.channel.clear_controller(self.controller_id);
    }

    /// Clear the controller, let the writer flush what is already queued,
    /// then stop reading.
    pub async fn close(self) {
        self.channel.clear_controller(self.controller_id);
        let _ = self.writer.await;
        self.reader.abort();
    }

    /// Resolves when the worker closes its end of the socket.
    pub async fn closed(&mut self) {
        let _ = (&mut self.reader).await;
    }
}

/// Connect to the worker socket at `path` (retrying while it is missing or
/// refusing connections) and install it as the channel's controller.
pub async fn connect(
    path: impl AsRef<Path>,
    channel: Arc<WorkerChannel>,
    policy: &ReconnectPolicy,
) -> Result<TransportHandle> {
    let path = path.as_ref();
    let stream = connect_with_retry(path, policy).await?;
    tracing::info!(path = %path.display(), "connected to worker");
    Ok(attach(stream, channel))
}

async fn connect_with_retry(path: &Path, policy: &ReconnectPolicy) -> Result<UnixStream> {
    let mut attempt = 1u32;
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                let kind = classify_io_error(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => {
                        return Err(e).with_context(|| {
                            format!("connect to worker socket {}", path.display())
                        });
                    }
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, ?kind, "worker socket not ready, retrying in {:?}", d);
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Wire an already-connected stream to `channel`.
pub fn attach(stream: UnixStream, channel: Arc<WorkerChannel>) -> TransportHandle {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let controller_id = channel.install_controller(tx);

    let writer = tokio::spawn(write_commands(write_half, rx));
    let reader = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            read_notifications(read_half, &channel).await;
            channel.clear_controller(controller_id);
        })
    };

    TransportHandle {
        channel,
        controller_id,
        reader,
        writer,
    }
}

async fn write_commands(mut socket: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<WorkerCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut line = match serde_json::to_string(&cmd) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(msg_type = cmd.msg_type(), "encode command: {}", e);
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = socket.write_all(line.as_bytes()).await {
            tracing::warn!("write to worker: {}", e);
            break;
        }
    }
}

async fn read_notifications(socket: OwnedReadHalf, channel: &WorkerChannel) {
    let mut lines = BufReader::new(socket).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<WorkerNotification>(line) {
                    Ok(notification) => channel.publish(notification),
                    Err(e) => tracing::warn!("malformed worker notification: {}", e),
                }
            }
            Ok(None) => {
                tracing::info!("worker closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!("read from worker: {}", e);
                break;
            }
        }
    }
}
