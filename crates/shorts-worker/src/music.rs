//! Background music selection.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use shorts_models::{MusicCatalog, MusicMood, MusicSelection};

use crate::error::{WorkerError, WorkerResult};

/// Chooses a music window from an injected catalog.
pub struct MusicPicker {
    catalog: MusicCatalog,
    rng: Mutex<StdRng>,
}

impl MusicPicker {
    pub fn new(catalog: MusicCatalog, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            catalog,
            rng: Mutex::new(rng),
        }
    }

    pub fn catalog(&self) -> &MusicCatalog {
        &self.catalog
    }

    /// Whether a previous selection can be reused for a video of `total_ms`.
    fn still_valid(&self, previous: &MusicSelection, mood: Option<MusicMood>, total_ms: u64) -> bool {
        let mood_matches = mood.is_none_or(|m| m == previous.mood);
        let within_track = self.catalog.tracks().iter().any(|t| {
            t.file == previous.file && previous.start_ms >= t.start_ms && previous.end_ms <= t.end_ms
        });
        mood_matches && within_track && previous.covers(total_ms)
    }

    /// Pick a window of at least `total_ms`.
    ///
    /// A still-valid `previous` selection is returned unchanged. Otherwise a
    /// random long-enough track of the mood is clipped at a random offset;
    /// when none is long enough the longest track is used whole and looped.
    pub fn select(
        &self,
        mood: Option<MusicMood>,
        total_ms: u64,
        previous: Option<&MusicSelection>,
    ) -> WorkerResult<MusicSelection> {
        if let Some(previous) = previous.filter(|p| self.still_valid(p, mood, total_ms)) {
            debug!(file = %previous.file, "Reusing music selection");
            return Ok(previous.clone());
        }

        let tracks = self.catalog.tracks_for(mood);
        let long_enough: Vec<_> = tracks.iter().filter(|t| t.length_ms() >= total_ms).collect();

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(track) = long_enough.choose(&mut *rng) {
            let slack = track.length_ms() - total_ms;
            let offset = if slack > 0 { rng.random_range(0..=slack) } else { 0 };
            let start_ms = track.start_ms + offset;
            return Ok(MusicSelection {
                file: track.file.clone(),
                start_ms,
                end_ms: start_ms + total_ms,
                mood: track.mood,
                looped: false,
            });
        }

        let longest = tracks
            .iter()
            .max_by_key(|t| t.length_ms())
            .ok_or_else(|| WorkerError::config_error("music catalog is empty"))?;
        debug!(file = %longest.file, total_ms, "No track long enough, looping the longest");
        Ok(MusicSelection {
            file: longest.file.clone(),
            start_ms: longest.start_ms,
            end_ms: longest.end_ms,
            mood: longest.mood,
            looped: true,
        })
    }
}
