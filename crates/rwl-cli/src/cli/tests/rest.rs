//! Tests for cancel, ping and id subcommands.

use super::parse;
use crate::cli::CliCommand;
use std::path::Path;

#[test]
fn cli_parse_cancel() {
    match parse(&["rwl", "cancel", "coll-1"]) {
        CliCommand::Cancel { name, socket } => {
            assert_eq!(name, "coll-1");
            assert!(socket.is_none());
        }
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_cancel_socket() {
    match parse(&["rwl", "cancel", "coll-1", "--socket", "/run/w.sock"]) {
        CliCommand::Cancel { socket, .. } => {
            assert_eq!(socket.as_deref(), Some(Path::new("/run/w.sock")));
        }
        _ => panic!("expected Cancel with --socket"),
    }
}

#[test]
fn cli_parse_ping() {
    match parse(&["rwl", "ping"]) {
        CliCommand::Ping { socket } => assert!(socket.is_none()),
        _ => panic!("expected Ping"),
    }
}

#[test]
fn cli_parse_id() {
    match parse(&["rwl", "id", "https://example.com/a.wacz"]) {
        CliCommand::Id { locator } => assert_eq!(locator, "https://example.com/a.wacz"),
        _ => panic!("expected Id"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    use clap::Parser;
    assert!(crate::cli::Cli::try_parse_from(["rwl", "status"]).is_err());
}
