//! TTL-refreshed entity cache backed by an [`EntityCatalog`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mention_core::{Category, Clock, EntityRecord, Match, SystemClock};
use mention_storage::{EntityCatalog, StorageResult};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::index::{build_candidates, Candidate, CategoryIndex};
use crate::scan::scan_snapshot;
use crate::MatcherSettings;

/// Key index for one category plus its scan-ready candidate list.
#[derive(Debug, Default)]
pub struct CategoryCache {
    index: CategoryIndex,
    candidates: Vec<Candidate>,
}

impl CategoryCache {
    pub fn build(category: Category, records: &[EntityRecord], settings: &MatcherSettings) -> Self {
        let index = CategoryIndex::from_records(records);
        let candidates = match category {
            Category::University => build_candidates(&index, settings.university_min_key_len, None),
            Category::Brand => build_candidates(
                &index,
                settings.brand_min_key_len,
                Some(&settings.brand_stoplist),
            ),
        };
        Self { index, candidates }
    }

    pub fn index(&self) -> &CategoryIndex {
        &self.index
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

/// Immutable view of the cache; scans run against one of these.
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    pub brands: Arc<CategoryCache>,
    pub universities: Arc<CategoryCache>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    pub fn category(&self, category: Category) -> &CategoryCache {
        match category {
            Category::Brand => &self.brands,
            Category::University => &self.universities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryReload {
    Replaced { rows: usize },
    KeptEmpty,
    KeptFailed { error: String },
}

impl CategoryReload {
    fn fetched(&self) -> bool {
        !matches!(self, CategoryReload::KeptFailed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadOutcome {
    pub brands: CategoryReload,
    pub universities: CategoryReload,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub brand_keys: usize,
    pub university_keys: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub reloads: usize,
}

pub struct EntityCache {
    catalog: Arc<dyn EntityCatalog>,
    clock: Arc<dyn Clock>,
    settings: MatcherSettings,
    state: RwLock<Arc<CacheSnapshot>>,
    reloads: AtomicUsize,
}

impl EntityCache {
    pub fn new(catalog: Arc<dyn EntityCatalog>, settings: MatcherSettings) -> Self {
        Self {
            catalog,
            clock: Arc::new(SystemClock),
            settings,
            state: RwLock::new(Arc::new(CacheSnapshot::default())),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.state.read().await.clone()
    }

    /// Reload when never loaded or when `now - loaded_at >= ttl`.
    /// Returns whether a reload ran.
    pub async fn ensure_fresh(&self, now: DateTime<Utc>) -> bool {
        let loaded_at = self.state.read().await.loaded_at;
        let stale = match loaded_at {
            None => true,
            // a clock that moved backwards counts as fresh
            Some(at) => (now - at).to_std().is_ok_and(|elapsed| elapsed >= self.settings.ttl),
        };
        if stale {
            self.reload(now).await;
        }
        stale
    }

    /// Full rebuild from the catalog.
    ///
    /// Both categories are fetched before the cache is touched. A category
    /// whose fetch fails or comes back empty keeps its previous index.
    /// `loaded_at` only advances if at least one fetch succeeded.
    pub async fn reload(&self, now: DateTime<Utc>) -> ReloadOutcome {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        let brand_rows = self.catalog.fetch_brands().await;
        let university_rows = self.catalog.fetch_active_universities().await;

        let current = self.snapshot().await;
        let (brands, brand_status) = self.rebuild(
            Category::Brand,
            brand_rows.map(|rows| rows.iter().map(EntityRecord::from).collect()),
            &current.brands,
        );
        let (universities, university_status) = self.rebuild(
            Category::University,
            university_rows.map(|rows| rows.iter().map(EntityRecord::from).collect()),
            &current.universities,
        );

        let loaded_at = if brand_status.fetched() || university_status.fetched() {
            Some(now)
        } else {
            current.loaded_at
        };

        let next = CacheSnapshot {
            brands,
            universities,
            loaded_at,
        };
        info!(
            brand_keys = next.brands.index().len(),
            university_keys = next.universities.index().len(),
            "entity cache reloaded"
        );
        *self.state.write().await = Arc::new(next);

        ReloadOutcome {
            brands: brand_status,
            universities: university_status,
        }
    }

    fn rebuild(
        &self,
        category: Category,
        fetched: StorageResult<Vec<EntityRecord>>,
        previous: &Arc<CategoryCache>,
    ) -> (Arc<CategoryCache>, CategoryReload) {
        match fetched {
            Ok(records) if records.is_empty() => {
                warn!(%category, "catalog returned no rows; keeping previous entries");
                (previous.clone(), CategoryReload::KeptEmpty)
            }
            Ok(records) => {
                let rows = records.len();
                let cache = CategoryCache::build(category, &records, &self.settings);
                (Arc::new(cache), CategoryReload::Replaced { rows })
            }
            Err(err) => {
                warn!(%category, %err, "catalog fetch failed; keeping previous entries");
                (
                    previous.clone(),
                    CategoryReload::KeptFailed {
                        error: err.to_string(),
                    },
                )
            }
        }
    }

    /// Refresh if stale, then scan `text` against the current entries.
    pub async fn scan(&self, text: &str) -> Vec<Match> {
        self.ensure_fresh(self.clock.now()).await;
        let snapshot = self.snapshot().await;
        scan_snapshot(&snapshot, text, &self.settings)
    }

    pub async fn stats(&self) -> CacheStats {
        let snapshot = self.snapshot().await;
        CacheStats {
            brand_keys: snapshot.brands.index().len(),
            university_keys: snapshot.universities.index().len(),
            loaded_at: snapshot.loaded_at,
            reloads: self.reloads.load(Ordering::SeqCst),
        }
    }
}
