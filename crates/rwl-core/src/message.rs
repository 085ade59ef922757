//! Wire messages exchanged with the background worker.
//!
//! Both directions are JSON objects tagged by `msg_type`. Commands are
//! fire-and-forget; whatever the worker has to say comes back later as a
//! notification on the shared channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::source::SourceDescriptor;

/// Command sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type")]
pub enum WorkerCommand {
    /// Load (import) a collection from a resolved source.
    #[serde(rename = "addColl")]
    AddColl {
        name: String,
        #[serde(rename = "skipExisting")]
        skip_existing: bool,
        file: SourceDescriptor,
        #[serde(rename = "extraConfig", default, skip_serializing_if = "Option::is_none")]
        extra_config: Option<Value>,
    },
    /// Advisory request to stop loading a collection.
    #[serde(rename = "cancelLoad")]
    CancelLoad { name: String },
    /// No-op keepalive.
    #[serde(rename = "ping")]
    Ping,
}

impl WorkerCommand {
    /// The `addColl` command; `skipExisting` is always set.
    pub fn add_coll(name: impl Into<String>, file: SourceDescriptor, extra_config: Option<Value>) -> Self {
        WorkerCommand::AddColl {
            name: name.into(),
            skip_existing: true,
            file,
            extra_config,
        }
    }

    pub fn msg_type(&self) -> &'static str {
        match self {
            WorkerCommand::AddColl { .. } => "addColl",
            WorkerCommand::CancelLoad { .. } => "cancelLoad",
            WorkerCommand::Ping => "ping",
        }
    }
}

/// Opaque reference to a platform file handle, as reported by the worker.
///
/// Only the platform layer knows how to turn it back into a handle (for the
/// CLI it is a filesystem path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHandleRef(pub String);

impl FileHandleRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Progress report for one collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollProgress {
    pub name: String,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "fileHandle", default)]
    pub file_handle: Option<FileHandleRef>,
    #[serde(rename = "currentSize", default)]
    pub current_size: Option<u64>,
    #[serde(rename = "totalSize", default)]
    pub total_size: Option<u64>,
}

impl CollProgress {
    /// Progress without error or byte counts.
    pub fn percent(name: impl Into<String>, percent: f64) -> Self {
        Self {
            name: name.into(),
            percent,
            error: None,
            file_handle: None,
            current_size: None,
            total_size: None,
        }
    }
}

/// Notification received from the worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msg_type")]
pub enum WorkerNotification {
    #[serde(rename = "collProgress")]
    CollProgress(CollProgress),
    /// The collection finished loading. Everything besides `name` is passed
    /// through untouched to `collection-loaded` consumers.
    #[serde(rename = "collAdded")]
    CollAdded {
        name: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// Any other notification kind; ignored.
    #[serde(other)]
    Unknown,
}

impl WorkerNotification {
    /// Collection the notification is about, if it carries one.
    pub fn collection(&self) -> Option<&str> {
        match self {
            WorkerNotification::CollProgress(p) => Some(&p.name),
            WorkerNotification::CollAdded { name, .. } => Some(name),
            WorkerNotification::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_coll_wire_format() {
        let cmd = WorkerCommand::add_coll(
            "mycoll",
            SourceDescriptor {
                source_url: "s3://bucket/key.wacz".into(),
                load_url: Some("https://bucket.s3.amazonaws.com/key.wacz".into()),
                name: Some("s3://bucket/key.wacz".into()),
                ..Default::default()
            },
            None,
        );
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "msg_type": "addColl",
                "name": "mycoll",
                "skipExisting": true,
                "file": {
                    "sourceUrl": "s3://bucket/key.wacz",
                    "loadUrl": "https://bucket.s3.amazonaws.com/key.wacz",
                    "name": "s3://bucket/key.wacz"
                }
            })
        );
    }

    #[test]
    fn add_coll_carries_extra_config() {
        let cmd = WorkerCommand::add_coll(
            "c",
            SourceDescriptor::passthrough("https://example.com/a.wacz"),
            Some(json!({"headers": {"Cookie": "x"}})),
        );
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["extraConfig"]["headers"]["Cookie"], "x");
    }

    #[test]
    fn cancel_and_ping_wire_format() {
        let cancel = WorkerCommand::CancelLoad { name: "c".into() };
        assert_eq!(
            serde_json::to_value(&cancel).unwrap(),
            json!({"msg_type": "cancelLoad", "name": "c"})
        );
        assert_eq!(
            serde_json::to_value(&WorkerCommand::Ping).unwrap(),
            json!({"msg_type": "ping"})
        );
    }

    #[test]
    fn parse_coll_progress() {
        let n: WorkerNotification = serde_json::from_value(json!({
            "msg_type": "collProgress",
            "name": "c",
            "percent": 42,
            "currentSize": 50,
            "totalSize": 100
        }))
        .unwrap();
        match n {
            WorkerNotification::CollProgress(p) => {
                assert_eq!(p.name, "c");
                assert_eq!(p.percent, 42.0);
                assert_eq!(p.current_size, Some(50));
                assert_eq!(p.total_size, Some(100));
                assert!(p.error.is_none());
            }
            other => panic!("expected CollProgress, got {:?}", other),
        }
    }

    #[test]
    fn parse_permission_error_with_handle() {
        let n: WorkerNotification = serde_json::from_value(json!({
            "msg_type": "collProgress",
            "name": "c",
            "percent": 0,
            "error": "permission_needed",
            "fileHandle": "/data/archive.wacz"
        }))
        .unwrap();
        match n {
            WorkerNotification::CollProgress(p) => {
                assert_eq!(p.error.as_deref(), Some("permission_needed"));
                assert_eq!(p.file_handle, Some(FileHandleRef("/data/archive.wacz".into())));
            }
            other => panic!("expected CollProgress, got {:?}", other),
        }
    }

    #[test]
    fn parse_coll_added_keeps_payload() {
        let n: WorkerNotification = serde_json::from_value(json!({
            "msg_type": "collAdded",
            "name": "c",
            "sourceUrl": "s3://bucket/key.wacz",
            "replayPrefix": "/w/c"
        }))
        .unwrap();
        match n {
            WorkerNotification::CollAdded { name, payload } => {
                assert_eq!(name, "c");
                assert_eq!(payload["replayPrefix"], "/w/c");
                assert!(!payload.contains_key("name"));
            }
            other => panic!("expected CollAdded, got {:?}", other),
        }
    }

    #[test]
    fn unknown_kinds_decode_to_unknown() {
        let n: WorkerNotification =
            serde_json::from_value(json!({"msg_type": "swUpdated", "name": "c"})).unwrap();
        assert_eq!(n, WorkerNotification::Unknown);
        assert_eq!(n.collection(), None);
    }
}
