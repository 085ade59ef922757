//! Source resolution: turn a user-supplied locator into what the worker loads.
//!
//! The coordinator only depends on the `SourceResolver` trait. The default
//! `SchemeResolver` knows the handful of schemes that need rewriting before
//! the worker sees them; everything else is passed through for the worker to
//! interpret itself.

mod id;
mod locator;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LoadError;
use crate::platform::Platform;

pub use id::collection_id;
pub use locator::{parse_locator, LocatorParts};

/// What the worker is told to load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_full_import: Option<bool>,
}

impl SourceDescriptor {
    /// Descriptor that leaves interpretation of `locator` to the worker.
    pub fn passthrough(locator: impl Into<String>) -> Self {
        Self {
            source_url: locator.into(),
            ..Default::default()
        }
    }
}

/// A previously supplied in-memory descriptor (e.g. a picked local file).
/// Its `extra_config` and `new_full_import` ride along on every load.
pub type LoadInfo = SourceDescriptor;

/// Schemes that need a secondary interactive step before the real source is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractiveScheme {
    GoogleDrive,
}

/// Outcome of resolving a locator.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Send this descriptor.
    Ready(SourceDescriptor),
    /// Send the raw locator; the worker resolves it.
    Passthrough,
    /// Wait for the presentation layer to supply the descriptor.
    Interactive(InteractiveScheme),
    /// The locator can not be loaded at all.
    Rejected(LoadError),
}

/// Inputs a resolver may consult besides the locator.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub load_info: Option<&'a LoadInfo>,
    pub platform: &'a Platform,
}

/// Implemented by resolver plugins. Errors are not fatal to a load: the
/// coordinator logs them and falls back to `Resolution::Passthrough`.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, locator: &str, ctx: &ResolveContext<'_>) -> Result<Resolution>;
}

/// Default resolver keyed on the locator's URL scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemeResolver;

impl SourceResolver for SchemeResolver {
    fn resolve(&self, locator: &str, ctx: &ResolveContext<'_>) -> Result<Resolution> {
        let parts = parse_locator(locator)?;

        let resolution = match parts.scheme.as_str() {
            "googledrive" => Resolution::Interactive(InteractiveScheme::GoogleDrive),

            "s3" => Resolution::Ready(SourceDescriptor {
                source_url: locator.to_string(),
                load_url: Some(format!("https://{}.s3.amazonaws.com{}", parts.host, parts.path)),
                name: Some(locator.to_string()),
                ..Default::default()
            }),

            "file" => match ctx.load_info {
                Some(info) => Resolution::Ready(info.clone()),
                None if ctx.platform.file_handles_enabled() => Resolution::Passthrough,
                None => Resolution::Rejected(LoadError::LocatorRejected {
                    locator: locator.to_string(),
                }),
            },

            "ipfs" if ctx.platform.packaged_app => {
                let prefix = ctx
                    .platform
                    .file_serve_prefix
                    .as_deref()
                    .context("packaged app has no file serve prefix for ipfs")?;
                Resolution::Ready(SourceDescriptor {
                    source_url: locator.to_string(),
                    load_url: Some(ipfs_proxy_url(prefix, locator)?),
                    ..Default::default()
                })
            }

            _ => Resolution::Passthrough,
        };
        Ok(resolution)
    }
}

/// Proxy URL under the app's file-serve prefix with the content hash (and
/// any path after it) in the `ipfs` query parameter. The fragment is dropped.
fn ipfs_proxy_url(prefix: &str, locator: &str) -> Result<String> {
    let mut url =
        url::Url::parse(prefix).with_context(|| format!("parse file serve prefix: {}", prefix))?;
    let without_fragment = locator.split('#').next().unwrap_or(locator);
    let hash = without_fragment
        .get("ipfs://".len()..)
        .context("ipfs locator too short")?;
    url.query_pairs_mut().append_pair("ipfs", hash);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_with(locator: &str, platform: &Platform, load_info: Option<&LoadInfo>) -> Result<Resolution> {
        SchemeResolver.resolve(
            locator,
            &ResolveContext {
                load_info,
                platform,
            },
        )
    }

    #[test]
    fn s3_rewrites_to_direct_storage_url() {
        let platform = Platform::default();
        let res = resolve_with("s3://bucket/key.wacz", &platform, None).unwrap();
        assert_eq!(
            res,
            Resolution::Ready(SourceDescriptor {
                source_url: "s3://bucket/key.wacz".into(),
                load_url: Some("https://bucket.s3.amazonaws.com/key.wacz".into()),
                name: Some("s3://bucket/key.wacz".into()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn googledrive_needs_interactive_step() {
        let platform = Platform::default();
        let res = resolve_with("googledrive://abc123", &platform, None).unwrap();
        assert_eq!(res, Resolution::Interactive(InteractiveScheme::GoogleDrive));
    }

    #[test]
    fn file_uses_load_info_when_present() {
        let platform = Platform::default();
        platform.file_handles.disable();
        let info = LoadInfo {
            source_url: "file://local.wacz".into(),
            load_url: Some("blob:abc".into()),
            new_full_import: Some(true),
            ..Default::default()
        };
        let res = resolve_with("file://local.wacz", &platform, Some(&info)).unwrap();
        assert_eq!(res, Resolution::Ready(info));
    }

    #[test]
    fn file_without_load_info_passes_through_with_file_handles() {
        let platform = Platform::default();
        let res = resolve_with("file://local.wacz", &platform, None).unwrap();
        assert_eq!(res, Resolution::Passthrough);
    }

    #[test]
    fn file_without_load_info_or_file_handles_is_rejected() {
        let platform = Platform::default();
        platform.file_handles.disable();
        let res = resolve_with("file://local.wacz", &platform, None).unwrap();
        match res {
            Resolution::Rejected(err) => {
                assert!(!err.allows_retry());
                assert!(matches!(err, LoadError::LocatorRejected { .. }));
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn ipfs_builds_proxy_url_in_packaged_app() {
        let platform = Platform {
            packaged_app: true,
            file_serve_prefix: Some("http://localhost:9990/replay/".into()),
            ..Platform::default()
        };
        let res = resolve_with("ipfs://bafyhash/archive.wacz#page", &platform, None).unwrap();
        match res {
            Resolution::Ready(desc) => {
                assert_eq!(desc.source_url, "ipfs://bafyhash/archive.wacz#page");
                assert_eq!(
                    desc.load_url.as_deref(),
                    Some("http://localhost:9990/replay/?ipfs=bafyhash%2Farchive.wacz")
                );
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn ipfs_passes_through_outside_packaged_app() {
        let platform = Platform::default();
        let res = resolve_with("ipfs://bafyhash", &platform, None).unwrap();
        assert_eq!(res, Resolution::Passthrough);
    }

    #[test]
    fn ipfs_without_prefix_is_a_resolution_error() {
        let platform = Platform {
            packaged_app: true,
            ..Platform::default()
        };
        assert!(resolve_with("ipfs://bafyhash", &platform, None).is_err());
    }

    #[test]
    fn other_schemes_pass_through() {
        let platform = Platform::default();
        for locator in ["https://example.com/a.wacz", "http://x/y.warc", "ftp://h/f"] {
            assert_eq!(
                resolve_with(locator, &platform, None).unwrap(),
                Resolution::Passthrough
            );
        }
    }

    #[test]
    fn unparseable_locator_is_an_error() {
        let platform = Platform::default();
        assert!(resolve_with("not a url", &platform, None).is_err());
    }
}
