//! Content-addressed asset caches.
//!
//! Entries live as a media file plus a JSON sidecar in one directory per
//! cache. Reads degrade to a miss on any error; writes propagate.

pub mod audio;
pub mod video;

pub use audio::{audio_cache_key, normalize_text, AudioCache, CachedAudio};
pub use video::{video_cache_key, VideoCache, VideoEntry};

use sha2::{Digest, Sha256};

/// Hex SHA-256 over `parts`, separated so adjacent fields cannot collide.
pub(crate) fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
