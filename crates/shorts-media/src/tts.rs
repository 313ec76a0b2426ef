//! Speech synthesis.
//!
//! The HTTP client speaks the TTS service contract: `POST <base>/tts` with
//! `{text, reference_audio, language, emotion}` returns either WAV bytes or a
//! JSON body with a `download_link` (and optionally word timings) to fetch
//! the audio from.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use shorts_models::{Emotion, VoiceConfig, WordTiming};

use crate::encode::AudioTranscoder;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::write_atomic;
use crate::metrics::record_request;
use crate::retry::RetryPolicy;

const SERVICE: &str = "tts";

/// One synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: VoiceConfig,
    pub emotion: Emotion,
}

impl SpeechRequest {
    /// Build a request, inferring emotion from the text's punctuation.
    pub fn new(text: impl Into<String>, voice: VoiceConfig) -> Self {
        let text = text.into();
        let emotion = Emotion::from_text(&text);
        Self { text, voice, emotion }
    }
}

/// Result of a synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Audio file written by the synthesizer
    pub audio_path: PathBuf,
    /// Duration, when the synthesizer reports one
    pub duration_secs: Option<f64>,
    /// Word timings, when the synthesizer reports them
    pub word_timings: Option<Vec<WordTiming>>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> MediaResult<Synthesis>;
}

#[derive(Debug, Serialize)]
struct TtsRequestBody<'a> {
    text: &'a str,
    reference_audio: &'a str,
    language: &'a str,
    emotion: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsLinkResponse {
    download_link: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    words: Option<Vec<WordTiming>>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TtsHealth {
    pub status: String,
    #[serde(default)]
    pub model_loaded: Option<bool>,
}

impl TtsHealth {
    pub fn is_ok(&self) -> bool {
        self.status == "ok" && self.model_loaded != Some(false)
    }
}

#[derive(Debug, Clone)]
pub struct TtsClientConfig {
    /// Service base URL
    pub base_url: Url,
    /// Where synthesized audio is written
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl TtsClientConfig {
    pub fn new(base_url: Url, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url,
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// HTTP client for the TTS service.
pub struct HttpTtsClient {
    http: Client,
    config: TtsClientConfig,
    retry: RetryPolicy,
    transcoder: Option<Arc<dyn AudioTranscoder>>,
}

impl HttpTtsClient {
    pub fn new(config: TtsClientConfig, retry: RetryPolicy) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shorts-media/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            retry,
            transcoder: None,
        })
    }

    /// Transcode every synthesized file (WAV) to MP3.
    pub fn with_transcoder(mut self, transcoder: Arc<dyn AudioTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    fn endpoint(&self, path: &str) -> MediaResult<Url> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| MediaError::invalid_response(format!("bad TTS URL {}: {}", path, e)))
    }

    /// Check that the service is up and its model is loaded.
    pub async fn health(&self) -> MediaResult<TtsHealth> {
        let response = self.http.get(self.endpoint("health")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::http(SERVICE, status.as_u16(), response.text().await.unwrap_or_default()));
        }
        Ok(response.json().await?)
    }

    async fn request_audio(&self, request: &SpeechRequest) -> MediaResult<(Vec<u8>, Option<f64>, Option<Vec<WordTiming>>)> {
        let body = TtsRequestBody {
            text: &request.text,
            reference_audio: request.voice.reference_audio.as_deref().unwrap_or(&request.voice.voice),
            language: &request.voice.language,
            emotion: request.emotion.as_str(),
        };

        let response = self.http.post(self.endpoint("tts")?).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MediaError::http(SERVICE, status.as_u16(), message));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if !is_json {
            return Ok((response.bytes().await?.to_vec(), None, None));
        }

        let link: TtsLinkResponse = response.json().await?;
        let audio = self.http.get(self.endpoint(&link.download_link)?).send().await?;
        let status = audio.status();
        if !status.is_success() {
            return Err(MediaError::http(SERVICE, status.as_u16(), "audio download failed"));
        }
        Ok((audio.bytes().await?.to_vec(), link.duration, link.words))
    }

    async fn finish(&self, wav: PathBuf) -> MediaResult<PathBuf> {
        let Some(transcoder) = &self.transcoder else {
            return Ok(wav);
        };
        let mp3 = wav.with_extension("mp3");
        let result = transcoder.encode(&wav, &mp3).await;
        let _ = tokio::fs::remove_file(&wav).await;
        result.map(|_| mp3)
    }

    fn output_path(&self) -> PathBuf {
        self.config.output_dir.join(format!("tts-{}.wav", Uuid::new_v4()))
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpTtsClient {
    async fn synthesize(&self, request: &SpeechRequest) -> MediaResult<Synthesis> {
        if request.text.trim().is_empty() {
            return Err(MediaError::synthesis_failed("text is empty"));
        }

        let result = self
            .retry
            .run("tts_synthesize", || self.request_audio(request))
            .await;
        record_request(SERVICE, result.is_ok());
        let (bytes, duration_secs, word_timings) = result?;

        if bytes.is_empty() {
            return Err(MediaError::synthesis_failed("service returned no audio"));
        }

        let wav = self.output_path();
        write_atomic(&wav, &bytes).await?;
        let audio_path = self.finish(wav).await?;

        info!(
            voice = %request.voice.voice,
            language = %request.voice.language,
            chars = request.text.len(),
            path = %audio_path.display(),
            "Synthesized speech"
        );
        debug!(timings = word_timings.as_ref().map(Vec::len), "Synthesis metadata");

        Ok(Synthesis {
            audio_path,
            duration_secs: duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            word_timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn voice() -> VoiceConfig {
        VoiceConfig {
            voice: "Charlotte".into(),
            language: "en".into(),
            reference_audio: Some("Charlotte.WAV".into()),
        }
    }

    fn client(server: &MockServer, dir: &TempDir) -> HttpTtsClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        HttpTtsClient::new(
            TtsClientConfig::new(base, dir.path()),
            RetryPolicy::default()
                .with_base_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_synthesize_writes_wav() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path("/tts"))
            .and(body_partial_json(serde_json::json!({
                "text": "Hello world?",
                "reference_audio": "Charlotte.WAV",
                "language": "en",
                "emotion": "question"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/wav")
                    .set_body_bytes(b"RIFFfake".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let synthesis = client(&server, &dir)
            .synthesize(&SpeechRequest::new("Hello world?", voice()))
            .await
            .unwrap();

        assert!(synthesis.audio_path.starts_with(dir.path()));
        assert_eq!(tokio::fs::read(&synthesis.audio_path).await.unwrap(), b"RIFFfake");
        assert!(synthesis.duration_secs.is_none());
    }

    #[tokio::test]
    async fn test_synthesize_follows_download_link() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path("/tts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "download_link": "/api/download/x.wav",
                "duration": 1.5,
                "words": [{"word": "Hi", "start_secs": 0.0, "end_secs": 1.5}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/download/x.wav"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF".to_vec()))
            .mount(&server)
            .await;

        let synthesis = client(&server, &dir)
            .synthesize(&SpeechRequest::new("Hi", voice()))
            .await
            .unwrap();

        assert_eq!(synthesis.duration_secs, Some(1.5));
        assert_eq!(synthesis.word_timings.map(|w| w.len()), Some(1));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path("/tts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .expect(4)
            .mount(&server)
            .await;

        let err = client(&server, &dir)
            .synthesize(&SpeechRequest::new("Hello", voice()))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "ok", "model_loaded": true})),
            )
            .mount(&server)
            .await;

        let health = client(&server, &dir).health().await.unwrap();
        assert!(health.is_ok());
    }
}
