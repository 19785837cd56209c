//! Bag-of-words sentiment label for a mention's context window.
//!
//! Each listed term found anywhere in the lowercased snippet (plain substring
//! containment) scores one point for its side. The side with strictly more
//! points wins; a tie is neutral. No negation handling.

use mention_core::Sentiment;
use serde::{Deserialize, Serialize};

pub const POSITIVE_TERMS: &[&str] = &[
    "best",
    "excellent",
    "great",
    "leading",
    "top",
    "innovative",
    "recommended",
    "popular",
    "trusted",
    "reliable",
    "outstanding",
    "renowned",
    "prestigious",
    "powerful",
    "strong",
    "impressive",
    "highly rated",
    "well-known",
];

pub const NEGATIVE_TERMS: &[&str] = &[
    "worst",
    "poor",
    "bad",
    "avoid",
    "expensive",
    "overpriced",
    "limited",
    "lacks",
    "lacking",
    "weak",
    "difficult",
    "complicated",
    "outdated",
    "problem",
    "issue",
    "complaint",
    "disappointing",
    "unreliable",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentLexicon {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl Default for SentimentLexicon {
    fn default() -> Self {
        Self {
            positive: POSITIVE_TERMS.iter().map(|s| s.to_string()).collect(),
            negative: NEGATIVE_TERMS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SentimentLexicon {
    pub fn classify(&self, snippet: &str) -> Sentiment {
        classify_with(snippet, &self.positive, &self.negative)
    }
}

/// Classify against the built-in term lists.
pub fn classify_sentiment(snippet: &str) -> Sentiment {
    classify_with(snippet, POSITIVE_TERMS, NEGATIVE_TERMS)
}

fn classify_with<T: AsRef<str>>(snippet: &str, positive: &[T], negative: &[T]) -> Sentiment {
    let lower = snippet.to_lowercase();
    let score = |terms: &[T]| {
        terms
            .iter()
            .filter(|t| lower.contains(&t.as_ref().to_lowercase()))
            .count()
    };
    let pos = score(positive);
    let neg = score(negative);
    if pos > neg {
        Sentiment::Positive
    } else if neg > pos {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}
