//! Stable collection ids derived from locators.

use sha2::{Digest, Sha256};

const ID_HEX_LEN: usize = 12;

/// `id-` followed by the first 12 hex digits of SHA-256(locator).
pub fn collection_id(locator: &str) -> String {
    let digest = Sha256::digest(locator.as_bytes());
    let hex = hex::encode(digest);
    format!("id-{}", &hex[..ID_HEX_LEN])
}
