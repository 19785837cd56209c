//! Pure text scan over a cache snapshot.

use std::collections::HashSet;

use mention_core::{Category, EntityId, Match};

use crate::cache::CacheSnapshot;
use crate::MatcherSettings;

const ELLIPSIS: &str = "...";

/// Scan `text` for known entity names.
///
/// Universities are tried before brands, each longest key first. Every
/// entity is reported at most once, at the first occurrence of the first
/// key that hits. Positions count matches in that scan order. Keys are
/// searched in the lowercased text; contexts come from the original.
pub fn scan_snapshot(snapshot: &CacheSnapshot, text: &str, settings: &MatcherSettings) -> Vec<Match> {
    let mut matches = Vec::new();
    if text.is_empty() {
        return matches;
    }

    let lowered = LoweredText::new(text);
    let mut found: HashSet<EntityId> = HashSet::new();
    let mut position = 0u32;

    for category in [Category::University, Category::Brand] {
        for candidate in snapshot.category(category).candidates() {
            if found.contains(&candidate.entity.id) {
                continue;
            }
            let Some((lower_start, lower_end)) = candidate.find_in(&lowered.lower) else {
                continue;
            };
            let (start, end) = lowered.original_range(lower_start, lower_end);
            found.insert(candidate.entity.id);
            position += 1;

            let context = extract_context(text, start, end, settings.context_radius);
            let sentiment = settings.lexicon.classify(&context);
            matches.push(Match {
                entity_id: candidate.entity.id,
                display_name: candidate.entity.canonical_name.clone(),
                category,
                position,
                context,
                sentiment,
            });
        }
    }

    matches
}

/// Lowercased copy of a text plus, for each byte of the copy, the byte
/// range of the original char it came from.
struct LoweredText {
    lower: String,
    origins: Vec<(usize, usize)>,
}

impl LoweredText {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut origins = Vec::with_capacity(lower.len());
        for (start, ch) in text.char_indices() {
            let end = start + ch.len_utf8();
            // per-char lowering has the same byte length as `str::to_lowercase`,
            // final sigma included
            let produced: usize = ch.to_lowercase().map(char::len_utf8).sum();
            origins.extend(std::iter::repeat((start, end)).take(produced));
        }
        debug_assert_eq!(origins.len(), lower.len());
        Self { lower, origins }
    }

    /// Original byte range covering `lower[start..end]`, widened to whole chars.
    fn original_range(&self, start: usize, end: usize) -> (usize, usize) {
        let first = self.origins.get(start).map_or(0, |o| o.0);
        let last = end
            .checked_sub(1)
            .and_then(|i| self.origins.get(i))
            .map_or(first, |o| o.1);
        (first, last.max(first))
    }
}

/// Up to `radius` characters either side of `text[start..end]`, with `...`
/// on any side that was cut short. Line breaks become spaces.
pub fn extract_context(text: &str, start: usize, end: usize, radius: usize) -> String {
    let window_start = if radius == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .nth(radius - 1)
            .map(|(i, _)| i)
            .unwrap_or(0)
    };
    let window_end = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let mut context = String::with_capacity(window_end - window_start + 2 * ELLIPSIS.len());
    if window_start > 0 {
        context.push_str(ELLIPSIS);
    }
    context.push_str(&text[window_start..window_end]);
    if window_end < text.len() {
        context.push_str(ELLIPSIS);
    }

    context
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}
