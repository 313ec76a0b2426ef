//! Shorts worker binary.
//!
//! ```text
//! shorts-worker submit <job.json> [--timeout-secs N]
//! shorts-worker status <job-id>
//! shorts-worker rerender <job-id> [--timeout-secs N]
//! shorts-worker delete <job-id>
//! shorts-worker cleanup [--max-age-hours N]
//! ```

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shorts_models::{JobConfig, JobId, MusicCatalog, MusicTrack, SceneInput, VoiceCatalog};
use shorts_storage::FsStore;
use shorts_worker::{Collaborators, PipelineCoordinator, WorkerConfig, WorkerError, WorkerResult};

/// Contents of a submission file.
#[derive(Debug, Deserialize)]
struct Submission {
    scenes: Vec<SceneInput>,
    #[serde(default)]
    config: JobConfig,
}

#[derive(Parser)]
#[command(name = "shorts-worker")]
#[command(about = "Short-form video job pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job file ({"scenes": [...], "config": {...}}) and wait for the render
    Submit {
        /// Path of the submission JSON
        file: PathBuf,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "3600")]
        timeout_secs: u64,
    },
    /// Print a job's status record as JSON
    Status {
        job_id: String,
    },
    /// Re-render a ready or failed job and wait for it
    Rerender {
        job_id: String,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "3600")]
        timeout_secs: u64,
    },
    /// Delete a job's documents and output
    Delete {
        job_id: String,
    },
    /// Remove cached downloads older than the given age
    Cleanup {
        /// Maximum age in hours (defaults to VIDEO_CACHE_TTL_HOURS)
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["shorts=info", "reqwest=warn", "hyper=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let cli = Cli::parse();

    if let Some(addr) = std::env::var("METRICS_LISTEN").ok().and_then(|a| a.parse::<std::net::SocketAddr>().ok()) {
        if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            error!("Failed to install metrics exporter: {}", e);
        }
    }

    info!("Starting shorts-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let coordinator = match build(config).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to start pipeline: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&coordinator, cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }

    coordinator.shutdown().await;
    info!("Worker shutdown complete");
}

async fn build(config: WorkerConfig) -> WorkerResult<PipelineCoordinator> {
    let store = Arc::new(FsStore::open(&config.data_dir).await?);
    let collaborators = Collaborators::from_config(&config)?;

    let mut voices = VoiceCatalog::builtin();
    if let Some(dir) = &config.voice_reference_dir {
        voices = voices.with_reference_dir(dir);
    }
    let music = match std::env::var("MUSIC_CATALOG") {
        Ok(path) => load_music_catalog(Path::new(&path)).await?,
        Err(_) => MusicCatalog::builtin(),
    };

    let coordinator = PipelineCoordinator::new(config, store, collaborators, music, voices).await?;
    let interrupted = coordinator.recover().await?;
    if !interrupted.is_empty() {
        info!(count = interrupted.len(), "Recovered interrupted jobs");
    }
    Ok(coordinator)
}

/// Read a JSON array of music tracks.
async fn load_music_catalog(path: &Path) -> WorkerResult<MusicCatalog> {
    let bytes = tokio::fs::read(path).await?;
    let tracks: Vec<MusicTrack> = serde_json::from_slice(&bytes)?;
    if tracks.is_empty() {
        return Err(WorkerError::config_error(format!(
            "music catalog {} has no tracks",
            path.display()
        )));
    }
    Ok(MusicCatalog::new(tracks))
}

async fn run(coordinator: &PipelineCoordinator, command: Commands) -> WorkerResult<()> {
    match command {
        Commands::Submit { file, timeout_secs } => {
            let bytes = tokio::fs::read(&file).await?;
            let submission: Submission = serde_json::from_slice(&bytes)?;
            let id = coordinator.submit(submission.scenes, submission.config).await?;
            println!("{}", id);

            let record = coordinator
                .wait_for_terminal(&id, Duration::from_secs(timeout_secs))
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Status { job_id } => {
            let record = coordinator.status(&JobId::from_string(job_id)).await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Rerender { job_id, timeout_secs } => {
            let id = JobId::from_string(job_id);
            coordinator.rerender(&id, None, None).await?;
            let record = coordinator
                .wait_for_terminal(&id, Duration::from_secs(timeout_secs))
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Delete { job_id } => {
            let id = JobId::from_string(job_id);
            if !coordinator.delete(&id).await? {
                return Err(WorkerError::JobNotFound(id));
            }
            println!("deleted {}", id);
        }
        Commands::Cleanup { max_age_hours } => {
            let hours = max_age_hours.unwrap_or(coordinator.config().video_cache_ttl_hours);
            let removed = coordinator.cleanup_cache(hours).await;
            println!("removed {} cached videos", removed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cleanup_age_is_optional() {
        let cli = Cli::try_parse_from(["shorts-worker", "cleanup"]).unwrap();
        assert!(matches!(cli.command, Commands::Cleanup { max_age_hours: None }));

        let cli = Cli::try_parse_from(["shorts-worker", "cleanup", "--max-age-hours", "12"]).unwrap();
        assert!(matches!(cli.command, Commands::Cleanup { max_age_hours: Some(12) }));

        assert!(Cli::try_parse_from(["shorts-worker", "cleanup", "--max-age-hours", "-1"]).is_err());
    }

    #[test]
    fn test_job_commands_require_an_id() {
        assert!(Cli::try_parse_from(["shorts-worker", "status"]).is_err());
        assert!(Cli::try_parse_from(["shorts-worker", "unknown"]).is_err());

        let cli = Cli::try_parse_from(["shorts-worker", "rerender", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rerender { ref job_id, timeout_secs: 3600 } if job_id == "abc"
        ));
    }
}
