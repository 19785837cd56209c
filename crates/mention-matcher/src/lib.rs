//! Entity matcher: a TTL-refreshed index of brand and university names and
//! a whole-word scanner that reports mentions with context and sentiment.

use std::collections::HashSet;
use std::time::Duration;

pub mod cache;
pub mod index;
pub mod scan;
pub mod sentiment;

pub use cache::{CacheSnapshot, CacheStats, CategoryReload, EntityCache, ReloadOutcome};
pub use index::{simplify_key, CategoryIndex, EntityRef};
pub use scan::{extract_context, scan_snapshot};
pub use sentiment::{classify_sentiment, SentimentLexicon};

pub const CRATE_NAME: &str = "mention-matcher";

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CONTEXT_RADIUS: usize = 100;
pub const UNIVERSITY_MIN_KEY_LEN: usize = 3;
pub const BRAND_MIN_KEY_LEN: usize = 2;

/// Generic English words that are never matched as brand keys.
pub const BRAND_STOPLIST: &[&str] = &[
    "the", "and", "for", "you", "can", "new", "get", "use", "make", "close",
];

#[derive(Debug, Clone)]
pub struct MatcherSettings {
    pub ttl: Duration,
    pub context_radius: usize,
    pub university_min_key_len: usize,
    pub brand_min_key_len: usize,
    pub brand_stoplist: HashSet<String>,
    pub lexicon: SentimentLexicon,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            context_radius: DEFAULT_CONTEXT_RADIUS,
            university_min_key_len: UNIVERSITY_MIN_KEY_LEN,
            brand_min_key_len: BRAND_MIN_KEY_LEN,
            brand_stoplist: BRAND_STOPLIST.iter().map(|s| s.to_string()).collect(),
            lexicon: SentimentLexicon::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stoplist_leaves_common_short_brand_words_alone() {
        let settings = MatcherSettings::default();
        assert_eq!(settings.brand_stoplist.len(), 10);
        assert!(settings.brand_stoplist.contains("close"));
        for word in ["one", "now", "way", "all"] {
            assert!(!settings.brand_stoplist.contains(word), "{word} is stoplisted");
        }
    }
}
