//! Tests for load argument handling, rendering, prompts and the permission broker.

use crate::cli::commands::LoadArgs;
use crate::cli::permission::FsPermissionBroker;
use crate::cli::{prompt, render};
use rwl_core::coordinator::{LoadSession, LoadState, PermissionBroker, PermissionState};
use rwl_core::message::FileHandleRef;
use rwl_core::source::collection_id;
use serde_json::json;

fn args(locator: &str) -> LoadArgs {
    LoadArgs {
        locator: locator.to_string(),
        name: None,
        socket: None,
        load_url: None,
        extra_config: None,
        full_import: false,
    }
}

#[test]
fn collection_name_defaults_to_locator_id() {
    let a = args("https://example.com/a.wacz");
    assert_eq!(a.collection_name(), collection_id("https://example.com/a.wacz"));
    let named = LoadArgs {
        name: Some("mine".into()),
        ..a
    };
    assert_eq!(named.collection_name(), "mine");
}

#[test]
fn load_info_absent_without_flags() {
    assert!(args("https://example.com/a.wacz").load_info().unwrap().is_none());
}

#[test]
fn load_info_carries_flags() {
    let a = LoadArgs {
        load_url: Some("https://mirror/a.wacz".into()),
        extra_config: Some(r#"{"x":1}"#.into()),
        full_import: true,
        ..args("file:///tmp/a.wacz")
    };
    let info = a.load_info().unwrap().unwrap();
    assert_eq!(info.source_url, "file:///tmp/a.wacz");
    assert_eq!(info.load_url.as_deref(), Some("https://mirror/a.wacz"));
    assert_eq!(info.extra_config, Some(json!({"x": 1})));
    assert_eq!(info.new_full_import, Some(true));
}

#[test]
fn load_info_rejects_bad_extra_config() {
    let a = LoadArgs {
        extra_config: Some("{not json".into()),
        ..args("https://example.com/a.wacz")
    };
    let err = a.load_info().unwrap_err();
    assert!(format!("{:#}", err).contains("--extra-config"));
}

#[test]
fn status_line_with_bytes() {
    let mut s = LoadSession::new("c");
    s.state = LoadState::Started;
    s.percent = 50;
    s.current_size = 1_048_576;
    s.total_size = 2 * 1_048_576;
    let line = render::status_line(&s);
    assert!(line.contains("started"), "{}", line);
    assert!(line.contains("1.0 / 2.0 MiB (50%)"), "{}", line);
}

#[test]
fn status_line_percent_only() {
    let mut s = LoadSession::new("c");
    s.state = LoadState::Started;
    s.percent = 7;
    s.total_size = 100;
    let line = render::status_line(&s);
    assert!(line.trim_end().ends_with("7%"), "{}", line);
    assert!(!line.contains("MiB"));
}

#[test]
fn yes_answers() {
    assert!(prompt::is_yes("y"));
    assert!(prompt::is_yes("YES"));
    assert!(!prompt::is_yes(""));
    assert!(!prompt::is_yes("nope"));
}

#[tokio::test]
async fn read_answer_trims_and_detects_eof() {
    let mut input: &[u8] = b"  https://example.com/x  \n";
    assert_eq!(prompt::read_answer(&mut input).await.unwrap(), "https://example.com/x");
    let mut empty: &[u8] = b"";
    assert!(prompt::read_answer(&mut empty).await.is_err());
}

#[tokio::test]
async fn fs_broker_grants_readable_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let handle = FileHandleRef(file.path().display().to_string());
    let state = FsPermissionBroker.request_read_permission(&handle).await.unwrap();
    assert_eq!(state, PermissionState::Granted);
}

#[tokio::test]
async fn fs_broker_errors_on_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let handle = FileHandleRef(dir.path().join("gone.wacz").display().to_string());
    assert!(FsPermissionBroker.request_read_permission(&handle).await.is_err());
}
