//! Split a locator into scheme, host and path.

use anyhow::{Context, Result};
use url::Url;

/// Scheme/host/path view of a locator such as `s3://bucket/key.wacz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorParts {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

/// Parses `locator` as a URL. Schemes are lowercased; a missing host is empty.
pub fn parse_locator(locator: &str) -> Result<LocatorParts> {
    let url = Url::parse(locator.trim()).with_context(|| format!("parse locator: {}", locator))?;
    Ok(LocatorParts {
        scheme: url.scheme().to_string(),
        host: url.host_str().unwrap_or_default().to_string(),
        path: url.path().to_string(),
    })
}
