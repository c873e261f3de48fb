//! HTTP download helper for pinned packaging tools.

use crate::pipeline::error::{Error, Result};

/// Downloads a file from a URL.
///
/// Returns the file contents as a byte vector. Used by the AppImage
/// generator to fetch its pinned packaging tool into the shared cache.
pub async fn download(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading {}", url);

    let response = reqwest::get(url).await.map_err(|e| Error::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(Error::Fetch {
            url: url.to_string(),
            reason: format!("HTTP status {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| Error::Fetch {
        url: url.to_string(),
        reason: format!("failed to read response: {e}"),
    })?;

    Ok(bytes.to_vec())
}
