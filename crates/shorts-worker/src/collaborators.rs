//! External collaborators used by the pipeline.

use std::sync::Arc;
use url::Url;

use shorts_media::{
    CommandRenderer, DurationProbe, FfmpegTranscoder, FfprobeDurationProbe, FootageSearch, HttpDownloader,
    HttpTtsClient, MediaDownloader, PexelsClient, PexelsConfig, Renderer, SpeechSynthesizer, TtsClientConfig,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// The tool integrations a coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub probe: Arc<dyn DurationProbe>,
    pub footage: Arc<dyn FootageSearch>,
    pub downloader: Arc<dyn MediaDownloader>,
    pub renderer: Arc<dyn Renderer>,
}

impl Collaborators {
    /// Production adapters: TTS and Pexels over HTTP, ffprobe, the render CLI.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let tts_url = Url::parse(&config.tts_url)
            .map_err(|e| WorkerError::config_error(format!("invalid TTS_URL {}: {}", config.tts_url, e)))?;
        let mut tts = HttpTtsClient::new(
            TtsClientConfig::new(tts_url, config.tts_scratch_dir()),
            config.retry.clone(),
        )?;
        if config.tts_transcode_mp3 {
            tts = tts.with_transcoder(Arc::new(FfmpegTranscoder::new()));
        }

        let api_key = config
            .pexels_api_key
            .clone()
            .ok_or_else(|| WorkerError::config_error("PEXELS_API_KEY is not set"))?;
        let footage = PexelsClient::new(PexelsConfig::new(api_key)?, config.retry.clone())?;

        let renderer = CommandRenderer::from_command_line(&config.render_command)?.with_timeout(config.render_timeout);

        Ok(Self {
            synthesizer: Arc::new(tts),
            probe: Arc::new(FfprobeDurationProbe::new()),
            footage: Arc::new(footage),
            downloader: Arc::new(HttpDownloader::new(config.retry.clone())?),
            renderer: Arc::new(renderer),
        })
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_pexels_key_is_a_config_error() {
        let config = WorkerConfig::default();
        let err = Collaborators::from_config(&config).unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_tts_url() {
        let config = WorkerConfig {
            tts_url: "not a url".into(),
            pexels_api_key: Some("key".into()),
            ..Default::default()
        };
        assert!(matches!(
            Collaborators::from_config(&config),
            Err(WorkerError::ConfigError(_))
        ));
    }
}
