//! In-process collaborators for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use shorts_media::{
    ClipQuery, DurationProbe, FootageSearch, MediaDownloader, MediaError, MediaResult, ProgressCallback,
    Renderer, SpeechRequest, SpeechSynthesizer, Synthesis,
};
use shorts_models::{ClipRef, MusicCatalog, RenderDocument, VoiceCatalog};
use shorts_storage::{KeyValueStore, MemoryStore};
use shorts_worker::{Collaborators, PipelineCoordinator, WorkerConfig};

/// Writes a small file per request and reports a fixed duration.
pub struct FakeSynthesizer {
    dir: PathBuf,
    duration_secs: f64,
    calls: AtomicUsize,
}

impl FakeSynthesizer {
    pub fn new(dir: &Path, duration_secs: f64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            duration_secs,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> MediaResult<Synthesis> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(&self.dir).await?;
        let audio_path = self.dir.join(format!("speech-{}.wav", n));
        tokio::fs::write(&audio_path, request.text.as_bytes()).await?;
        Ok(Synthesis {
            audio_path,
            duration_secs: Some(self.duration_secs),
            word_timings: None,
        })
    }
}

pub struct FixedProbe(pub f64);

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn duration(&self, _path: &Path) -> MediaResult<f64> {
        Ok(self.0)
    }
}

/// Serves clips from a fixed pool in order, skipping excluded IDs.
pub struct PoolSearch {
    pool: Vec<ClipRef>,
}

impl PoolSearch {
    pub fn new(size: usize) -> Self {
        let pool = (0..size)
            .map(|i| ClipRef {
                id: format!("clip-{}", i),
                url: format!("https://videos.example.com/clip-{}.mp4", i),
                width: 1080,
                height: 1920,
                duration_secs: 12.0,
                local_path: None,
            })
            .collect();
        Self { pool }
    }

    pub fn empty() -> Self {
        Self { pool: Vec::new() }
    }
}

#[async_trait]
impl FootageSearch for PoolSearch {
    async fn search(&self, query: &ClipQuery) -> MediaResult<Vec<ClipRef>> {
        Ok(self
            .pool
            .iter()
            .filter(|clip| query.accepts(clip))
            .take(query.count)
            .cloned()
            .collect())
    }

    async fn by_url(&self, url: &str) -> MediaResult<ClipRef> {
        self.pool
            .iter()
            .find(|clip| clip.url == url)
            .cloned()
            .ok_or_else(|| MediaError::invalid_response(format!("unknown clip {}", url)))
    }
}

pub struct FakeDownloader;

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, url.as_bytes()).await?;
        Ok(url.len() as u64)
    }
}

/// Reports progress, then writes the document as the "video".
pub struct FakeRenderer {
    delay: Duration,
    fail_with: Option<String>,
    renders: AtomicUsize,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_with: None,
            renders: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        document: &RenderDocument,
        output: &Path,
        on_progress: ProgressCallback,
    ) -> MediaResult<PathBuf> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        on_progress(0.1);
        tokio::time::sleep(self.delay).await;
        on_progress(0.6);

        if let Some(message) = &self.fail_with {
            return Err(MediaError::render_failed(message.clone(), Some(1)));
        }

        on_progress(1.0);
        tokio::fs::write(output, serde_json::to_vec(document)?).await?;
        Ok(output.to_path_buf())
    }
}

/// A coordinator over temp directories and fakes.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<dyn KeyValueStore>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub renderer: Arc<FakeRenderer>,
    pub coordinator: PipelineCoordinator,
}

pub fn test_config(root: &Path) -> WorkerConfig {
    WorkerConfig {
        data_dir: root.join("data"),
        cache_dir: root.join("cache"),
        output_dir: root.join("output"),
        progress_interval: Duration::from_millis(5),
        random_seed: Some(7),
        ..WorkerConfig::default()
    }
}

pub struct HarnessBuilder {
    search: PoolSearch,
    renderer: FakeRenderer,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            search: PoolSearch::new(20),
            renderer: FakeRenderer::new(),
            store: None,
        }
    }

    pub fn search(mut self, search: PoolSearch) -> Self {
        self.search = search;
        self
    }

    pub fn renderer(mut self, renderer: FakeRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let synthesizer = Arc::new(FakeSynthesizer::new(&dir.path().join("tts"), 3.0));
        let renderer = Arc::new(self.renderer);

        let collaborators = Collaborators {
            synthesizer: synthesizer.clone(),
            probe: Arc::new(FixedProbe(3.0)),
            footage: Arc::new(self.search),
            downloader: Arc::new(FakeDownloader),
            renderer: renderer.clone(),
        };

        let coordinator = PipelineCoordinator::new(
            test_config(dir.path()),
            store.clone(),
            collaborators,
            MusicCatalog::builtin(),
            VoiceCatalog::builtin(),
        )
        .await
        .unwrap();

        Harness {
            dir,
            store,
            synthesizer,
            renderer,
            coordinator,
        }
    }
}
