//! Release tag lookup for menu labels.
//!
//! The release metadata is scraped rather than parsed: only the `tag_name`
//! string is needed and it never contains quotes or escapes.

use std::path::Path;

use log::{debug, warn};

use crate::io::Transfer;

/// Label used whenever the tag cannot be determined.
pub const FALLBACK_VERSION: &str = "Latest";

const TAG_MARKER: &str = "\"tag_name\":\"";

/// Text between the `tag_name` marker and the next quote.
pub fn scrape_tag(body: &str) -> Option<&str> {
    let start = body.find(TAG_MARKER)? + TAG_MARKER.len();
    let len = body[start..].find('"')?;
    let tag = &body[start..start + len];
    (!tag.is_empty()).then_some(tag)
}

/// Download `api_url` to `scratch` and return its release tag.
///
/// Never fails; every problem turns into [`FALLBACK_VERSION`]. The scratch
/// file is removed whenever the download produced one.
pub async fn probe_version(transfer: &dyn Transfer, api_url: &str, scratch: &Path) -> String {
    if let Err(e) = transfer.fetch(api_url, scratch, None).await {
        warn!("Release lookup {} failed: {}", api_url, e);
        return FALLBACK_VERSION.to_string();
    }

    let body = tokio::fs::read(scratch).await;
    let _ = tokio::fs::remove_file(scratch).await;

    let body = match body {
        Ok(body) => String::from_utf8_lossy(&body).into_owned(),
        Err(e) => {
            warn!("Could not read {}: {}", scratch.display(), e);
            return FALLBACK_VERSION.to_string();
        }
    };

    match scrape_tag(&body) {
        Some(tag) => {
            debug!("{} -> {}", api_url, tag);
            tag.to_string()
        }
        None => {
            warn!("No tag_name in response from {}", api_url);
            FALLBACK_VERSION.to_string()
        }
    }
}
