//! Persistence across store instances.

use std::sync::Arc;
use tempfile::TempDir;

use shorts_models::{
    AudioRef, Caption, JobConfig, JobDocument, JobStatus, MusicMood, MusicSelection, SceneInput,
};
use shorts_storage::{FsStore, JobDocuments, KeyValueStore, StatusStore};

fn sample_document() -> JobDocument {
    let mut scene = SceneInput::new("Hello world. How are you?", ["hello", "world"]);
    scene.video_urls = vec!["https://videos.example.com/1.mp4".into()];
    scene.audio = Some(AudioRef {
        url: "/cache/audio/abc.mp3".into(),
        duration_secs: 1.75,
        text: Some("Hello world.".into()),
    });
    scene.captions = Some(vec![Caption::new("Hello", 0, 800), Caption::new("world.", 800, 1750)]);

    let mut doc = JobDocument::new(
        vec![scene, SceneInput::new("Goodbye world", ["goodbye"])],
        JobConfig {
            music: Some(MusicMood::Chill),
            ..Default::default()
        },
    );
    doc.music = Some(MusicSelection {
        file: "Champion - Telecasted.mp3".into(),
        start_ms: 1200,
        end_ms: 9700,
        mood: MusicMood::Chill,
        looped: false,
    });
    doc
}

#[tokio::test]
async fn test_job_document_roundtrip_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let doc = sample_document();
    let key = format!("jobs/{}/input.json", doc.id);

    let first = Arc::new(FsStore::open(dir.path()).await.unwrap());
    JobDocuments::new(first.clone()).save_input(&doc).await.unwrap();
    let written = first.get(&key).await.unwrap().unwrap();

    // Fresh instance over the same directory
    let second = Arc::new(FsStore::open(dir.path()).await.unwrap());
    let docs = JobDocuments::new(second.clone());
    let loaded = docs.load_input(&doc.id).await.unwrap().unwrap();
    assert_eq!(loaded, doc);

    docs.save_input(&loaded).await.unwrap();
    let rewritten = second.get(&key).await.unwrap().unwrap();
    assert_eq!(written, rewritten);
}

#[tokio::test]
async fn test_status_survives_restart() {
    let dir = TempDir::new().unwrap();
    let doc = sample_document();

    {
        let statuses = StatusStore::new(Arc::new(FsStore::open(dir.path()).await.unwrap()));
        statuses
            .set_status(&doc.id, JobStatus::Processing, Some("Queued".into()), None, Some("Queued".into()))
            .await
            .unwrap();
    }

    let statuses = StatusStore::new(Arc::new(FsStore::open(dir.path()).await.unwrap()));
    let record = statuses.get_status(&doc.id).await;
    assert_eq!(record.status, JobStatus::Processing);
    assert_eq!(statuses.interrupted_jobs().await.unwrap(), vec![doc.id.clone()]);
}
