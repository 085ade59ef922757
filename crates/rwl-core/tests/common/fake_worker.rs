//! Scripted worker process stand-in for integration tests.
//!
//! Listens on a Unix socket, records every command line it receives, and
//! answers `addColl` according to a `Script`.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Two progress updates, then `collAdded`.
    Complete,
    /// Report the missing-local-file error.
    MissingLocalFile,
    /// Accept commands but never answer.
    Silent,
}

pub struct FakeWorker {
    pub socket: PathBuf,
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakeWorker {
    /// Commands received so far, as raw JSON.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_types(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|v| v["msg_type"].as_str().map(str::to_string))
            .collect()
    }
}

/// Bind `dir/worker.sock` and serve one connection in the background.
pub fn start(dir: &Path, script: Script) -> FakeWorker {
    let socket = dir.join("worker.sock");
    let listener = UnixListener::bind(&socket).expect("bind worker socket");
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(cmd) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            log.lock().unwrap().push(cmd.clone());
            if cmd["msg_type"] != "addColl" {
                continue;
            }
            let name = cmd["name"].as_str().unwrap_or_default().to_string();
            for reply in replies(script, &name) {
                let mut out = reply.to_string();
                out.push('\n');
                if write_half.write_all(out.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    });
    FakeWorker { socket, received }
}

fn replies(script: Script, name: &str) -> Vec<Value> {
    match script {
        Script::Complete => vec![
            json!({"msg_type": "collProgress", "name": name, "percent": 40, "currentSize": 400, "totalSize": 1000}),
            json!({"msg_type": "collProgress", "name": "someone-else", "percent": 90}),
            json!({"msg_type": "collProgress", "name": name, "percent": 80, "currentSize": 800, "totalSize": 1000}),
            json!({"msg_type": "collAdded", "name": name, "title": "Archive", "size": 1000}),
        ],
        Script::MissingLocalFile => vec![
            json!({"msg_type": "collProgress", "name": name, "percent": 0, "error": "missing_local_file"}),
        ],
        Script::Silent => Vec::new(),
    }
}
