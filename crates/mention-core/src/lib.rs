//! Core domain model for brand/university mention extraction.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "mention-core";

pub type EntityId = Uuid;
pub type ExecutionId = Uuid;

/// The two disjoint entity groups tracked by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Brand,
    University,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Brand => "brand",
            Category::University => "university",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row shape served by the brand catalog (unfiltered).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandRow {
    pub id: EntityId,
    pub brand_name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Row shape served by the university catalog (active rows only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversityRow {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Category-agnostic view of a catalog row: a canonical name plus the
/// alternate spellings it may be looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub canonical_name: String,
    pub alternate_keys: Vec<String>,
}

impl From<&BrandRow> for EntityRecord {
    fn from(row: &BrandRow) -> Self {
        Self {
            id: row.id,
            canonical_name: row.brand_name.clone(),
            alternate_keys: row.slug.iter().cloned().collect(),
        }
    }
}

impl From<&UniversityRow> for EntityRecord {
    fn from(row: &UniversityRow) -> Self {
        Self {
            id: row.id,
            canonical_name: row.name.clone(),
            alternate_keys: row
                .slug
                .iter()
                .chain(row.short_name.iter())
                .cloned()
                .collect(),
        }
    }
}

/// One entity mention found in a scanned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub entity_id: EntityId,
    pub display_name: String,
    pub category: Category,
    /// 1-based rank in scan order (universities first), not textual order.
    pub position: u32,
    pub context: String,
    pub sentiment: Sentiment,
}

/// Previously generated AI response text eligible for re-extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub execution_id: ExecutionId,
    pub response_text: String,
}

/// Time source for cache freshness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
