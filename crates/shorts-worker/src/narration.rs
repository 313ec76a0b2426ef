//! Narration text processing: cleaning, fragment splitting and captions.

use regex::Regex;
use std::sync::LazyLock;

use shorts_models::{captions_are_monotonic, secs_to_ms, Caption, WordTiming};

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{Extended_Pictographic}\u{FE0F}\u{200D}\u{20E3}]").expect("valid emoji regex")
});
static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("valid hashtag regex"));
static ELLIPSIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\.\s*){2,}|…").expect("valid ellipsis regex"));
static REAIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"R\$\s?(\d+(?:[.,]\d+)?)").expect("valid reais regex"));
static DOLLARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s?(\d+(?:[.,]\d+)?)").expect("valid dollar regex"));
static EUROS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"€\s?(\d+(?:[.,]\d+)?)").expect("valid euro regex"));
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([.,!?;:])").expect("valid punctuation regex"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("valid sentence regex"));

/// Relative caption weight of a word when timings are unavailable.
const BASE_WEIGHT: f64 = 1.0;
const EDGE_WEIGHT: f64 = 1.2;
const PUNCTUATED_WEIGHT: f64 = 1.3;

/// Tolerated overrun of word timings past the audio duration.
const TIMING_TOLERANCE_MS: u64 = 250;

/// Prepare narration for speech: drop emoji and hashtags, normalize quotes
/// and ellipses, and spell out currency amounts.
pub fn clean_text(text: &str) -> String {
    let text = EMOJI.replace_all(text, "");
    let text = HASHTAG.replace_all(&text, "");
    let text = text
        .replace(['\u{201C}', '\u{201D}', '\u{201E}', '"'], "")
        .replace(['\u{2018}', '\u{2019}', '`'], "'");
    let text = ELLIPSIS.replace_all(&text, ". ");
    let text = REAIS.replace_all(&text, "$1 reais");
    let text = DOLLARS.replace_all(&text, "$1 dollars");
    let text = EUROS.replace_all(&text, "$1 euros");

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1").trim().to_string()
}

/// Split cleaned narration into sentence fragments.
///
/// A fragment ends at a run of `.`, `!` or `?` followed by whitespace or the
/// end of the text, so decimals like `3.5` never split.
pub fn split_fragments(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        push_fragment(&mut fragments, &text[start..m.end()]);
        start = m.end();
    }
    push_fragment(&mut fragments, &text[start..]);
    fragments
}

fn push_fragment(fragments: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    // A bare "." left over from ellipsis normalization is not a sentence.
    if candidate.chars().any(char::is_alphanumeric) {
        fragments.push(candidate.to_string());
    }
}

/// Fragments of a scene's narration; never empty for non-blank text.
pub fn narration_fragments(text: &str) -> Vec<String> {
    let fragments = split_fragments(&clean_text(text));
    if fragments.is_empty() && !text.trim().is_empty() {
        vec![text.trim().to_string()]
    } else {
        fragments
    }
}

/// Captions from synthesizer word timings, if they are well formed and fit
/// inside the audio.
pub fn captions_from_timings(timings: &[WordTiming], duration_secs: f64) -> Option<Vec<Caption>> {
    if timings.is_empty() {
        return None;
    }
    let limit_ms = secs_to_ms(duration_secs) + TIMING_TOLERANCE_MS;

    let mut captions = Vec::with_capacity(timings.len());
    for timing in timings {
        let valid = timing.start_secs.is_finite()
            && timing.end_secs.is_finite()
            && timing.start_secs >= 0.0
            && !timing.word.trim().is_empty();
        if !valid {
            return None;
        }
        let start_ms = (timing.start_secs * 1000.0).round() as u64;
        let end_ms = (timing.end_secs * 1000.0).round() as u64;
        if end_ms > limit_ms {
            return None;
        }
        captions.push(Caption::new(timing.word.trim(), start_ms, end_ms));
    }

    captions_are_monotonic(&captions).then_some(captions)
}

/// Spread `text`'s words over `duration_secs`, giving the first, last and
/// punctuated words a little more time.
pub fn distribute_captions(text: &str, duration_secs: f64) -> Vec<Caption> {
    let duration_ms = secs_to_ms(duration_secs);
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || duration_ms == 0 {
        return Vec::new();
    }

    let last = words.len() - 1;
    let weights: Vec<f64> = words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let punctuated = word.ends_with(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'));
            let weight = if punctuated { PUNCTUATED_WEIGHT } else { BASE_WEIGHT };
            if i == 0 || i == last {
                weight.max(EDGE_WEIGHT)
            } else {
                weight
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();

    let mut captions = Vec::with_capacity(words.len());
    let mut elapsed = 0.0;
    let mut start_ms = 0;
    for (i, (word, weight)) in words.iter().zip(&weights).enumerate() {
        elapsed += weight;
        let end_ms = if i == last {
            duration_ms
        } else {
            (elapsed / total * duration_ms as f64).round() as u64
        };
        captions.push(Caption::new(*word, start_ms, end_ms));
        start_ms = end_ms;
    }

    if captions_are_monotonic(&captions) {
        captions
    } else {
        // Too many words for the audio length to give each its own span.
        vec![Caption::new(words.join(" "), 0, duration_ms)]
    }
}

/// Captions for one fragment: synthesizer timings when usable, otherwise an
/// even weighted split.
pub fn build_captions(text: &str, duration_secs: f64, timings: Option<&[WordTiming]>) -> Vec<Caption> {
    timings
        .and_then(|t| captions_from_timings(t, duration_secs))
        .unwrap_or_else(|| distribute_captions(text, duration_secs))
}

/// Whether stored captions can be reused for audio of `duration_secs`.
pub fn captions_fit(captions: &[Caption], duration_secs: f64) -> bool {
    let duration_ms = secs_to_ms(duration_secs);
    !captions.is_empty()
        && captions_are_monotonic(captions)
        && captions.last().is_some_and(|c| c.end_ms <= duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shorts_models::Emotion;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("Hello 👋 world! #shorts #fyp"), "Hello world!");
        assert_eq!(clean_text("He said “wow”… really"), "He said wow. really");
        assert_eq!(clean_text("It costs $5 today"), "It costs 5 dollars today");
        assert_eq!(clean_text("Custa R$ 20,50 agora"), "Custa 20,50 reais agora");
        assert_eq!(clean_text("Only €10!"), "Only 10 euros!");
        assert_eq!(clean_text("  spaced   out .  "), "spaced out.");
    }

    #[test]
    fn test_split_fragments() {
        assert_eq!(
            split_fragments("Hello world. How are you? Great!"),
            vec!["Hello world.", "How are you?", "Great!"]
        );
        assert_eq!(split_fragments("Pi is 3.14 roughly. Yes"), vec!["Pi is 3.14 roughly.", "Yes"]);
        assert_eq!(split_fragments("Wait?! What"), vec!["Wait?!", "What"]);
        assert!(split_fragments("").is_empty());
    }

    #[test]
    fn test_narration_fragments_never_empty() {
        assert_eq!(narration_fragments("🔥🔥"), vec!["🔥🔥"]);
        assert_eq!(narration_fragments("Hello world"), vec!["Hello world"]);
        assert!(narration_fragments("   ").is_empty());
    }

    #[test]
    fn test_distribute_captions() {
        let captions = distribute_captions("Hello big world.", 3.0);
        assert_eq!(captions.len(), 3);
        assert_eq!(captions[0].start_ms, 0);
        assert_eq!(captions[2].end_ms, 3000);
        assert!(captions_are_monotonic(&captions));
        // Edge and punctuated words get more time than the middle word.
        assert!(captions[0].duration_ms() > captions[1].duration_ms());
        assert!(captions[2].duration_ms() > captions[1].duration_ms());
        assert_eq!(captions[2].emotion, Emotion::Neutral);
    }

    #[test]
    fn test_distribute_degenerate_duration() {
        let captions = distribute_captions("a b c d e", 0.002);
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].end_ms, 2);
        assert!(distribute_captions("a b", 0.0).is_empty());
    }

    #[test]
    fn test_captions_from_timings() {
        let timings = vec![
            WordTiming {
                word: "Hello".into(),
                start_secs: 0.0,
                end_secs: 0.4,
            },
            WordTiming {
                word: "world?".into(),
                start_secs: 0.45,
                end_secs: 1.0,
            },
        ];
        let captions = captions_from_timings(&timings, 1.0).unwrap();
        assert_eq!(captions[1].start_ms, 450);
        assert_eq!(captions[1].emotion, Emotion::Question);

        // Overruns the audio.
        assert!(captions_from_timings(&timings, 0.5).is_none());

        let backwards = vec![timings[1].clone(), timings[0].clone()];
        assert!(captions_from_timings(&backwards, 1.0).is_none());
        assert_eq!(build_captions("Hello world?", 1.0, Some(&backwards)).last().unwrap().end_ms, 1000);
    }

    #[test]
    fn test_captions_fit() {
        let captions = vec![Caption::new("a", 0, 500), Caption::new("b", 500, 1000)];
        assert!(captions_fit(&captions, 1.0));
        assert!(!captions_fit(&captions, 0.8));
        assert!(!captions_fit(&[], 1.0));
    }
}
