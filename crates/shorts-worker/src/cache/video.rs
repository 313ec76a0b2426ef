//! Downloaded stock footage cache.
//!
//! Keyed by the SHA-256 of the clip URL. Concurrent requests for one URL
//! share a single in-flight download. The in-memory index is rebuilt from
//! the sidecars when the cache is opened.

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use shorts_media::fs_utils::write_atomic;
use shorts_media::MediaDownloader;

use super::hash_key;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::{record_cache_lookup, VIDEO_CACHE};

/// A downloaded clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub url: String,
    /// Media file name inside the cache directory
    pub file: String,
    pub size: u64,
    pub downloaded_at: DateTime<Utc>,
}

type InFlight = Shared<BoxFuture<'static, Result<PathBuf, String>>>;

pub fn video_cache_key(url: &str) -> String {
    hash_key(&[url.trim()])
}

/// File extension of the URL's path, `mp4` when absent or unusual.
fn extension_for(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
        })
        .filter(|e| e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "mp4".to_string())
}

pub struct VideoCache {
    dir: PathBuf,
    downloader: Arc<dyn MediaDownloader>,
    index: Arc<RwLock<HashMap<String, VideoEntry>>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl VideoCache {
    /// Open the cache, indexing every sidecar whose media file still exists.
    pub async fn open(dir: impl Into<PathBuf>, downloader: Arc<dyn MediaDownloader>) -> WorkerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let mut index = HashMap::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let sidecar = match fs::read(&path).await.map_err(WorkerError::from).and_then(|bytes| {
                serde_json::from_slice::<VideoEntry>(&bytes).map_err(WorkerError::from)
            }) {
                Ok(sidecar) => sidecar,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable video sidecar: {}", e);
                    continue;
                }
            };

            if fs::try_exists(dir.join(&sidecar.file)).await.unwrap_or(false) {
                index.insert(key, sidecar);
            } else {
                let _ = fs::remove_file(&path).await;
            }
        }

        info!(dir = %dir.display(), entries = index.len(), "Video cache opened");
        Ok(Self {
            dir,
            downloader,
            index: Arc::new(RwLock::new(index)),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    pub async fn entry(&self, url: &str) -> Option<VideoEntry> {
        self.index.read().await.get(&video_cache_key(url)).cloned()
    }

    /// Local path of `url`, downloading it on a miss.
    pub async fn get_or_download(&self, url: &str) -> WorkerResult<PathBuf> {
        let key = video_cache_key(url);

        if let Some(entry) = self.index.read().await.get(&key).cloned() {
            let path = self.dir.join(&entry.file);
            if fs::try_exists(&path).await.unwrap_or(false) {
                record_cache_lookup(VIDEO_CACHE, true);
                return Ok(path);
            }
        }

        let download = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(shared) => {
                    debug!(url = %url, "Joining in-flight download");
                    shared.clone()
                }
                None => {
                    record_cache_lookup(VIDEO_CACHE, false);
                    let shared = self.start_download(key.clone(), url.to_string());
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let result = download.await;
        self.in_flight.lock().await.remove(&key);
        result.map_err(WorkerError::download_failed)
    }

    fn start_download(&self, key: String, url: String) -> InFlight {
        let downloader = Arc::clone(&self.downloader);
        let index = Arc::clone(&self.index);
        let file = format!("{}.{}", key, extension_for(&url));
        let path = self.dir.join(&file);
        let sidecar_path = self.dir.join(format!("{}.json", key));

        async move {
            let size = downloader.download(&url, &path).await.map_err(|e| e.to_string())?;
            let entry = VideoEntry {
                url,
                file,
                size,
                downloaded_at: Utc::now(),
            };
            let bytes = serde_json::to_vec_pretty(&entry).map_err(|e| e.to_string())?;
            write_atomic(&sidecar_path, &bytes).await.map_err(|e| e.to_string())?;

            index.write().await.insert(key, entry);
            Ok(path)
        }
        .boxed()
        .shared()
    }

    /// Download every URL concurrently. One failure never cancels the rest.
    pub async fn prefetch(&self, urls: &[String]) -> Vec<(String, WorkerResult<PathBuf>)> {
        let results = join_all(urls.iter().map(|url| self.get_or_download(url))).await;
        urls.iter().cloned().zip(results).collect()
    }

    /// Remove entries downloaded more than `max_age_hours` ago.
    ///
    /// Returns the number of entries removed. Failures on one entry are
    /// logged and the sweep continues.
    pub async fn cleanup(&self, max_age_hours: u64) -> usize {
        let cutoff = i64::try_from(max_age_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            debug!(max_age_hours, "Cleanup age exceeds the representable range, nothing to remove");
            return 0;
        };
        let expired: Vec<(String, VideoEntry)> = self
            .index
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.downloaded_at < cutoff)
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        let mut removed = 0;
        for (key, entry) in expired {
            let media = self.dir.join(&entry.file);
            let sidecar = self.dir.join(format!("{}.json", key));

            let result = async {
                remove_if_exists(&media).await?;
                remove_if_exists(&sidecar).await
            }
            .await;

            match result {
                Ok(()) => {
                    self.index.write().await.remove(&key);
                    removed += 1;
                }
                Err(e) => warn!(url = %entry.url, "Failed to remove cached video: {}", e),
            }
        }

        info!(removed, max_age_hours, "Video cache cleanup finished");
        removed
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl std::fmt::Debug for VideoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCache").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shorts_media::{MediaError, MediaResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeDownloader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaDownloader for FakeDownloader {
        async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if url.contains("broken") {
                return Err(MediaError::download_failed("connection reset"));
            }
            tokio::fs::write(dest, url.as_bytes()).await?;
            Ok(url.len() as u64)
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("https://cdn.example.com/a/clip.MOV?x=1"), "mov");
        assert_eq!(extension_for("https://cdn.example.com/a/clip"), "mp4");
        assert_eq!(extension_for("not a url"), "mp4");
    }

    #[tokio::test]
    async fn test_concurrent_downloads_are_shared() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(FakeDownloader::default());
        let cache = VideoCache::open(dir.path(), downloader.clone()).await.unwrap();

        let url = "https://cdn.example.com/clip.mp4";
        let (a, b, c) = tokio::join!(
            cache.get_or_download(url),
            cache.get_or_download(url),
            cache.get_or_download(url)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);

        cache.get_or_download(url).await.unwrap();
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_index_is_rebuilt_on_open() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(FakeDownloader::default());
        let url = "https://cdn.example.com/clip.mp4";
        {
            let cache = VideoCache::open(dir.path(), downloader.clone()).await.unwrap();
            cache.get_or_download(url).await.unwrap();
        }

        let reopened = VideoCache::open(dir.path(), downloader.clone()).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.entry(url).await.map(|e| e.size), Some(url.len() as u64));
        reopened.get_or_download(url).await.unwrap();
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prefetch_is_all_settled() {
        let dir = TempDir::new().unwrap();
        let cache = VideoCache::open(dir.path(), Arc::new(FakeDownloader::default()))
            .await
            .unwrap();

        let urls = vec![
            "https://cdn.example.com/a.mp4".to_string(),
            "https://cdn.example.com/broken.mp4".to_string(),
            "https://cdn.example.com/b.mp4".to_string(),
        ];
        let results = cache.prefetch(&urls).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(WorkerError::DownloadFailed(_))));
        assert!(results[2].1.is_ok());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_entries() {
        let dir = TempDir::new().unwrap();
        let cache = VideoCache::open(dir.path(), Arc::new(FakeDownloader::default()))
            .await
            .unwrap();
        let url = "https://cdn.example.com/old.mp4";
        let path = cache.get_or_download(url).await.unwrap();

        assert_eq!(cache.cleanup(1).await, 0);

        let key = video_cache_key(url);
        cache.index.write().await.get_mut(&key).unwrap().downloaded_at = Utc::now() - TimeDelta::hours(5);
        assert_eq!(cache.cleanup(1).await, 1);

        assert!(cache.is_empty().await);
        assert!(!path.exists());
        assert!(!dir.path().join(format!("{}.json", key)).exists());
    }

    #[tokio::test]
    async fn test_cleanup_with_huge_age_removes_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = VideoCache::open(dir.path(), Arc::new(FakeDownloader::default()))
            .await
            .unwrap();
        let url = "https://cdn.example.com/kept.mp4";
        cache.get_or_download(url).await.unwrap();

        let key = video_cache_key(url);
        cache.index.write().await.get_mut(&key).unwrap().downloaded_at = Utc::now() - TimeDelta::days(365);

        assert_eq!(cache.cleanup(u64::MAX).await, 0);
        assert_eq!(cache.cleanup(i64::MAX as u64).await, 0);
        assert_eq!(cache.cleanup(200_000_000).await, 0);
        assert_eq!(cache.len().await, 1);
    }
}
