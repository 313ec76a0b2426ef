//! HTTP file downloads.

use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::temp_path_for;
use crate::metrics::record_request;
use crate::retry::RetryPolicy;

const SERVICE: &str = "download";

#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written.
    ///
    /// `dest` only ever holds a complete file.
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64>;
}

/// Streams downloads to a `.part` file and renames on completion.
pub struct HttpDownloader {
    http: Client,
    retry: RetryPolicy,
}

impl HttpDownloader {
    pub fn new(retry: RetryPolicy) -> MediaResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .user_agent(concat!("shorts-media/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, retry })
    }

    async fn fetch(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::http(SERVICE, status.as_u16(), format!("GET {}", url)));
        }

        let part = temp_path_for(dest);
        let mut file = fs::File::create(&part).await?;
        let mut written = 0u64;

        let streamed: MediaResult<()> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            let _ = fs::remove_file(&part).await;
            return Err(e);
        }
        if written == 0 {
            let _ = fs::remove_file(&part).await;
            return Err(MediaError::download_failed(format!("empty response from {}", url)));
        }

        drop(file);
        if let Err(e) = fs::rename(&part, dest).await {
            let _ = fs::remove_file(&part).await;
            return Err(e.into());
        }
        Ok(written)
    }
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        debug!(url = %url, dest = %dest.display(), "Downloading");
        let result = self.retry.run("download", || self.fetch(url, dest)).await;
        record_request(SERVICE, result.is_ok());
        let bytes = result?;

        info!(url = %url, bytes, "Download complete");
        Ok(bytes)
    }
}
