//! Atomic file placement.
//!
//! Files land at their final path only when complete: content is written or
//! copied to a sibling temp file and renamed into place.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

/// Sibling temp path for `dst`, unique per call.
pub fn temp_path_for(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4()))
}

async fn ensure_parent(dst: &Path) -> MediaResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Copy `src` to `dst` atomically; `src` is left untouched.
pub async fn copy_atomic(src: &Path, dst: &Path) -> MediaResult<u64> {
    if !fs::try_exists(src).await.unwrap_or(false) {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }
    ensure_parent(dst).await?;

    let tmp = temp_path_for(dst);
    let bytes = match fs::copy(src, &tmp).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
    };
    if let Err(e) = fs::rename(&tmp, dst).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(bytes)
}

/// Write `bytes` to `dst` atomically.
pub async fn write_atomic(dst: &Path, bytes: &[u8]) -> MediaResult<()> {
    ensure_parent(dst).await?;
    let tmp = temp_path_for(dst);
    if let Err(e) = fs::write(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp, dst).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Move `src` to `dst`, copying across filesystems when rename fails.
pub async fn move_file(src: &Path, dst: &Path) -> MediaResult<()> {
    ensure_parent(dst).await?;
    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        // EXDEV: source and destination are on different filesystems
        Err(e) if e.raw_os_error() == Some(18) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device move, copying");
            copy_atomic(src, dst).await?;
            let _ = fs::remove_file(src).await;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_atomic_keeps_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.wav");
        let dst = dir.path().join("cache").join("b.wav");
        fs::write(&src, b"audio").await.unwrap();

        assert_eq!(copy_atomic(&src, &dst).await.unwrap(), 5);
        assert!(src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = copy_atomic(&dir.path().join("missing"), &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_move_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("new.mp3");
        let dst = dir.path().join("old.mp3");
        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();

        move_file(&src, &dst).await.unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("meta.json");
        write_atomic(&dst, b"{}").await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
