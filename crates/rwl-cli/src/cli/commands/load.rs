//! `rwl load` – load one collection and follow it until it completes or fails.

use anyhow::{anyhow, bail, Context, Result};
use rwl_core::channel::WorkerChannel;
use rwl_core::config::LoaderConfig;
use rwl_core::coordinator::{LoadCoordinator, LoadSession, LoadState, LoaderEvent};
use rwl_core::error::LoadError;
use rwl_core::platform::Platform;
use rwl_core::source::{collection_id, InteractiveScheme, LoadInfo, SourceDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use crate::cli::permission::FsPermissionBroker;
use crate::cli::{prompt, render};

#[derive(Debug, Clone)]
pub struct LoadArgs {
    pub locator: String,
    pub name: Option<String>,
    pub socket: Option<PathBuf>,
    pub load_url: Option<String>,
    pub extra_config: Option<String>,
    pub full_import: bool,
}

impl LoadArgs {
    pub fn collection_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| collection_id(&self.locator))
    }

    /// In-memory descriptor built from the flags, if any flag needs one.
    pub fn load_info(&self) -> Result<Option<LoadInfo>> {
        let extra_config = match &self.extra_config {
            Some(raw) => Some(
                serde_json::from_str::<serde_json::Value>(raw).context("parse --extra-config")?,
            ),
            None => None,
        };
        if self.load_url.is_none() && extra_config.is_none() && !self.full_import {
            return Ok(None);
        }
        Ok(Some(LoadInfo {
            source_url: self.locator.clone(),
            load_url: self.load_url.clone(),
            name: None,
            extra_config,
            new_full_import: self.full_import.then_some(true),
        }))
    }
}

pub async fn run_load(cfg: &LoaderConfig, args: LoadArgs) -> Result<()> {
    let platform = Arc::new(Platform::from_config(cfg));
    let name = args.collection_name();

    let mut builder = LoadCoordinator::builder(name.clone(), Arc::clone(&platform))
        .permission_broker(Arc::new(FsPermissionBroker))
        .keepalive_interval(cfg.keepalive_interval());
    if let Some(info) = args.load_info()? {
        builder = builder.load_info(info);
    }

    // No worker channel outside a secure context; the coordinator reports it.
    let mut transport = None;
    if platform.secure_context {
        let channel = Arc::new(WorkerChannel::default());
        transport = Some(super::connect_worker(cfg, args.socket.clone(), Arc::clone(&channel)).await?);
        builder = builder.channel(channel);
    }
    let coordinator = builder.build();
    tracing::info!(collection = %name, locator = %args.locator, "rwl load");

    let outcome = tokio::select! {
        r = follow(&coordinator, args.locator) => r,
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel();
            render::end_line();
            Err(anyhow!("load of {} cancelled", name))
        }
    };

    if let Some(transport) = transport {
        transport.close().await;
    }
    outcome
}

/// Render session changes and answer the prompts the session asks for.
async fn follow(coordinator: &LoadCoordinator, locator: String) -> Result<()> {
    let mut rx = coordinator.subscribe();
    let mut events = coordinator.events();
    {
        let coordinator = coordinator.clone();
        let locator = locator.clone();
        tokio::spawn(async move { coordinator.start(locator).await });
    }

    let mut retried = false;
    let mut handled: Option<(u64, LoadState)> = None;
    loop {
        rx.changed().await.context("load coordinator stopped")?;
        let session = rx.borrow_and_update().clone();
        render::draw(&session);

        let key = (session.generation, session.state);
        if handled == Some(key) {
            continue;
        }
        match session.state {
            LoadState::Completed => {
                render::end_line();
                report_loaded(&session, &mut events).await;
                return Ok(());
            }
            LoadState::Resolving(scheme) if session.awaiting_interactive => {
                handled = Some(key);
                render::end_line();
                let question = format!("{} needs a direct download URL for {}: ", scheme_label(scheme), locator);
                let url = prompt::ask(&question).await?;
                if url.is_empty() {
                    bail!("no URL given for {}", locator);
                }
                let source = SourceDescriptor {
                    source_url: locator.clone(),
                    load_url: Some(url),
                    ..Default::default()
                };
                if !coordinator.submit_interactive_result(source) {
                    tracing::debug!("interactive result arrived after the attempt was replaced");
                }
            }
            LoadState::PermissionNeeded => {
                handled = Some(key);
                render::end_line();
                let handle = session
                    .file_handle
                    .as_ref()
                    .map(|h| h.as_str().to_string())
                    .unwrap_or_default();
                if !prompt::confirm(&format!("The worker needs read access to {}. Grant it?", handle)).await? {
                    bail!("read permission for {} not granted", handle);
                }
                if !coordinator.grant_permission().await {
                    bail!("read permission for {} could not be granted", handle);
                }
            }
            LoadState::Errored => {
                handled = Some(key);
                render::end_line();
                if session.error == Some(LoadError::MissingLocalFile)
                    && file_support_turned_off(&mut events).await
                {
                    eprintln!("Local file is gone; file access is disabled for the rest of this run. Reloading.");
                    continue;
                }
                let message = session.error_message().unwrap_or_default();
                eprintln!("Load failed: {}", message);
                if !session.error_allow_retry || retried || !prompt::confirm("Retry?").await? {
                    return Err(failure(&session));
                }
                retried = true;
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.retry().await });
            }
            _ => {}
        }
    }
}

fn failure(session: &LoadSession) -> anyhow::Error {
    anyhow!(
        "could not load {}: {}",
        session.source_locator,
        session.error_message().unwrap_or_default()
    )
}

fn scheme_label(scheme: InteractiveScheme) -> &'static str {
    match scheme {
        InteractiveScheme::GoogleDrive => "Google Drive",
    }
}

const LOADED_EVENT_WAIT: Duration = Duration::from_secs(1);

/// The `collection-loaded` event trails the snapshot slightly; wait briefly for its payload.
async fn report_loaded(session: &LoadSession, events: &mut Receiver<LoaderEvent>) {
    println!("Loaded {}", session.collection_name);
    loop {
        match tokio::time::timeout(LOADED_EVENT_WAIT, events.recv()).await {
            Ok(Ok(LoaderEvent::CollectionLoaded(loaded))) => {
                if !loaded.payload.is_empty() {
                    println!("{}", serde_json::Value::Object(loaded.payload));
                }
                return;
            }
            Ok(Ok(LoaderEvent::FileHandleSupportDisabled)) | Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) | Err(_) => return,
        }
    }
}

/// A missing local file turns file-handle support off once per process, and
/// the coordinator then reloads on its own. True if that happened just now.
async fn file_support_turned_off(events: &mut Receiver<LoaderEvent>) -> bool {
    loop {
        match tokio::time::timeout(LOADED_EVENT_WAIT, events.recv()).await {
            Ok(Ok(LoaderEvent::FileHandleSupportDisabled)) => return true,
            Ok(Ok(LoaderEvent::CollectionLoaded(_))) | Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) | Err(_) => return false,
        }
    }
}
