use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use reqwest::redirect::Policy;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::{Progress, Transfer};
use crate::error::TransferError;
use crate::power::SleepInhibitor;

/// Maximum redirects followed before giving up (GitHub release assets
/// bounce through one or two).
const MAX_REDIRECTS: usize = 10;

/// Plain HTTP GET downloader
pub struct HttpTransfer {
    user_agent: String,
    inhibitor: Arc<dyn SleepInhibitor>,
}

impl HttpTransfer {
    pub fn new(user_agent: impl Into<String>, inhibitor: Arc<dyn SleepInhibitor>) -> Self {
        Self {
            user_agent: user_agent.into(),
            inhibitor,
        }
    }

    fn client(&self) -> Result<Client, TransferError> {
        Client::builder()
            .user_agent(&self.user_agent)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(TransferError::Client)
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        mut progress: Option<Progress<'_>>,
    ) -> Result<u64, TransferError> {
        let client = self.client()?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| TransferError::Create {
                path: dest.to_path_buf(),
                source,
            })?;

        let mut resp = client
            .get(url)
            .send()
            .await
            .map_err(TransferError::Network)?;

        if !resp.status().is_success() {
            return Err(TransferError::Status(resp.status()));
        }

        let total = resp.content_length().unwrap_or(0);
        let mut downloaded = 0u64;

        while let Some(chunk) = resp.chunk().await.map_err(TransferError::Network)? {
            file.write_all(&chunk).await.map_err(TransferError::Write)?;
            downloaded += chunk.len() as u64;

            if let Some(report) = progress.as_mut() {
                report(downloaded, total);
            }
        }

        file.flush().await.map_err(TransferError::Write)?;
        Ok(downloaded)
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<Progress<'_>>,
    ) -> Result<u64, TransferError> {
        // Held across the whole download, released on every return path.
        let _awake = progress.is_some().then(|| self.inhibitor.inhibit());

        debug!("GET {} -> {}", url, dest.display());
        match self.download(url, dest, progress).await {
            Ok(bytes) => {
                info!("Downloaded {} ({} bytes)", url, bytes);
                Ok(bytes)
            }
            Err(e) => {
                warn!("Download of {} failed: {}", url, e);
                if !matches!(e, TransferError::Create { .. }) {
                    let _ = tokio::fs::remove_file(dest).await;
                }
                Err(e)
            }
        }
    }
}
