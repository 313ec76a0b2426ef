use std::path::Path;

use shorts_media::{HttpTtsClient, RetryPolicy, TtsClientConfig};
use shorts_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with data_dir={}",
        config.data_dir.display()
    );
    for dir in [&config.data_dir, &config.cache_dir, &config.output_dir] {
        ensure_dir(dir).await?;
    }
    shorts_media::check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    shorts_media::check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    ensure_env_present(&["PEXELS_API_KEY"])?;

    if std::env::var("SELFCHECK_TTS").is_ok() {
        ensure_tts(&config).await?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

async fn ensure_tts(config: &WorkerConfig) -> anyhow::Result<()> {
    let base = url::Url::parse(&config.tts_url)?;
    let client = HttpTtsClient::new(
        TtsClientConfig::new(base, config.tts_scratch_dir()),
        RetryPolicy::none(),
    )?;
    let health = client.health().await?;
    if !health.is_ok() {
        return Err(anyhow::anyhow!("TTS service not ready: {:?}", health));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
