//! Stock footage lookup with layered fallback search.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use shorts_media::{ClipQuery, FootageSearch};
use shorts_models::{ClipRef, Orientation};

use crate::error::{WorkerError, WorkerResult};

/// Broad terms tried when nothing specific matched.
pub const GENERIC_TERMS: &[&str] = &[
    "nature",
    "technology",
    "city",
    "people",
    "abstract",
    "ocean",
    "sky",
    "business",
];

/// Highest page requested from the unfiltered catalog.
const MAX_RANDOM_PAGE: u32 = 10;

/// Search terms to try in order, most specific first.
///
/// The full phrase, then the phrase with trailing words dropped one at a
/// time, then each individual term not tried yet.
pub fn fallback_queries(terms: &[String]) -> Vec<String> {
    let cleaned: Vec<&str> = terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    let words: Vec<&str> = cleaned.iter().flat_map(|t| t.split_whitespace()).collect();

    let mut queries: Vec<String> = Vec::new();
    let mut push = |q: String| {
        if !q.is_empty() && !queries.iter().any(|existing| existing.eq_ignore_ascii_case(&q)) {
            queries.push(q);
        }
    };

    for len in (1..=words.len()).rev() {
        push(words[..len].join(" "));
    }
    for term in &cleaned {
        push((*term).to_string());
    }
    queries
}

/// Finds clips for scenes, keeping a job's clips distinct.
pub struct FootageFinder {
    search: Arc<dyn FootageSearch>,
    rng: Mutex<StdRng>,
    min_clip_secs: f64,
}

impl FootageFinder {
    /// `seed` makes fallback ordering and random picks reproducible.
    pub fn new(search: Arc<dyn FootageSearch>, seed: Option<u64>, min_clip_secs: f64) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            search,
            rng: Mutex::new(rng),
            min_clip_secs,
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Resolve explicit clip URLs. Any failed lookup fails the scene.
    pub async fn by_urls(&self, urls: &[String], exclude: &mut HashSet<String>) -> WorkerResult<Vec<ClipRef>> {
        let mut clips = Vec::with_capacity(urls.len());
        for url in urls {
            let clip = self.search.by_url(url).await?;
            exclude.insert(clip.id.clone());
            clips.push(clip);
        }
        Ok(clips)
    }

    /// Reuse clips pinned by an earlier resolution, searching for the rest.
    ///
    /// Up to `needed` pinned URLs are kept in order. Pinned clips that can no
    /// longer be looked up or are already used elsewhere are replaced by
    /// search results.
    pub async fn reuse_or_find(
        &self,
        scene: usize,
        pinned: &[String],
        terms: &[String],
        needed: usize,
        orientation: Orientation,
        exclude: &mut HashSet<String>,
    ) -> WorkerResult<Vec<ClipRef>> {
        let mut clips = Vec::with_capacity(needed);
        for url in pinned.iter().take(needed) {
            match self.search.by_url(url).await {
                Ok(clip) if !exclude.contains(&clip.id) => {
                    exclude.insert(clip.id.clone());
                    clips.push(clip);
                }
                Ok(clip) => debug!(scene, id = %clip.id, "Pinned clip already used"),
                Err(e) => warn!(scene, url = %url, "Pinned clip lookup failed: {}", e),
            }
        }

        if clips.len() < needed {
            let missing = needed - clips.len();
            debug!(scene, reused = clips.len(), missing, "Topping up pinned clips");
            clips.extend(self.find(scene, terms, missing, orientation, exclude).await?);
        }
        Ok(clips)
    }

    /// Find `needed` distinct clips for scene `scene`.
    ///
    /// Tiers: the search-term fallbacks, a shuffled pool of generic terms,
    /// then a random page of the unfiltered catalog. Found IDs are added to
    /// `exclude`.
    pub async fn find(
        &self,
        scene: usize,
        terms: &[String],
        needed: usize,
        orientation: Orientation,
        exclude: &mut HashSet<String>,
    ) -> WorkerResult<Vec<ClipRef>> {
        let mut queries = fallback_queries(terms);
        let mut generic: Vec<String> = GENERIC_TERMS.iter().map(|t| t.to_string()).collect();
        self.with_rng(|rng| generic.shuffle(rng));
        generic.retain(|g| !queries.iter().any(|q| q.eq_ignore_ascii_case(g)));
        queries.extend(generic);

        let mut found: Vec<ClipRef> = Vec::new();
        for query in &queries {
            if found.len() >= needed {
                break;
            }
            let search = ClipQuery::terms(query.clone(), orientation, needed - found.len())
                .with_min_duration(self.min_clip_secs)
                .with_excluded(exclude.clone());
            match self.search.search(&search).await {
                Ok(clips) => {
                    let added = take_accepted(&search, clips, &mut found, exclude, needed);
                    debug!(scene, query = %query, added, "Footage search");
                }
                Err(e) => warn!(scene, query = %query, "Footage search failed: {}", e),
            }
        }

        if found.len() < needed {
            let page = self.with_rng(|rng| rng.random_range(1..=MAX_RANDOM_PAGE));
            let search = ClipQuery::unfiltered(orientation, needed * 3)
                .with_min_duration(self.min_clip_secs)
                .with_excluded(exclude.clone())
                .with_page(page);
            match self.search.search(&search).await {
                Ok(mut clips) => {
                    self.with_rng(|rng| clips.shuffle(rng));
                    let added = take_accepted(&search, clips, &mut found, exclude, needed);
                    info!(scene, page, added, "Used unfiltered footage");
                }
                Err(e) => warn!(scene, "Unfiltered footage search failed: {}", e),
            }
        }

        if found.is_empty() {
            return Err(WorkerError::NoVideosFound {
                scene,
                terms: terms.join(", "),
            });
        }
        if found.len() < needed {
            return Err(WorkerError::CountMismatch {
                scene,
                needed,
                found: found.len(),
            });
        }
        Ok(found)
    }
}

fn take_accepted(
    query: &ClipQuery,
    clips: Vec<ClipRef>,
    found: &mut Vec<ClipRef>,
    exclude: &mut HashSet<String>,
    needed: usize,
) -> usize {
    let mut added = 0;
    for clip in clips {
        if found.len() >= needed {
            break;
        }
        if query.accepts(&clip) && !exclude.contains(&clip.id) {
            exclude.insert(clip.id.clone());
            found.push(clip);
            added += 1;
        }
    }
    added
}
