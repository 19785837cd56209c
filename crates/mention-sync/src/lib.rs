//! Extraction pipeline: scan AI responses for mentions and persist them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mention_core::{Category, ExecutionId, Match};
use mention_matcher::{EntityCache, MatcherSettings};
use mention_storage::{EntityCatalog, MentionRepository, PgStore};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "mention-sync";

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub database_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub context_radius: usize,
    pub rules_path: PathBuf,
    pub bind_addr: String,
}

impl ExtractionConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            cache_ttl_secs: std::env::var("MENTION_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            context_radius: std::env::var("MENTION_CONTEXT_RADIUS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(mention_matcher::DEFAULT_CONTEXT_RADIUS),
            rules_path: std::env::var("MENTION_RULES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("rules/matcher.yaml")),
            bind_addr: std::env::var("MENTION_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8088".to_string()),
        }
    }

    /// Defaults, overridden by env values and then by the rules file if present.
    pub fn matcher_settings(&self) -> Result<MatcherSettings> {
        let mut settings = MatcherSettings {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            context_radius: self.context_radius,
            ..Default::default()
        };
        if let Some(rules) = load_matcher_rules(&self.rules_path)? {
            rules.apply(&mut settings);
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    brand_stoplist: Option<Vec<String>>,
    #[serde(default)]
    sentiment: Option<SentimentRules>,
}

#[derive(Debug, Clone, Deserialize)]
struct SentimentRules {
    #[serde(default)]
    positive: Option<Vec<String>>,
    #[serde(default)]
    negative: Option<Vec<String>>,
}

impl MatcherRulesFile {
    pub fn apply(self, settings: &mut MatcherSettings) {
        if let Some(words) = self.brand_stoplist {
            settings.brand_stoplist = words.into_iter().map(|w| w.to_lowercase()).collect();
        }
        if let Some(sentiment) = self.sentiment {
            if let Some(positive) = sentiment.positive {
                settings.lexicon.positive = positive;
            }
            if let Some(negative) = sentiment.negative {
                settings.lexicon.negative = negative;
            }
        }
    }
}

/// A missing file is not an error; a malformed one is.
pub fn load_matcher_rules(path: &Path) -> Result<Option<MatcherRulesFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let rules = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(rules))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub execution_id: ExecutionId,
    pub brands: Vec<Match>,
    pub universities: Vec<Match>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReprocessSummary {
    pub run_id: Uuid,
    pub topic: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub brand_mentions: usize,
    pub university_mentions: usize,
    pub error: Option<String>,
}

pub struct MentionPipeline {
    cache: Arc<EntityCache>,
    repository: Arc<dyn MentionRepository>,
}

impl MentionPipeline {
    pub fn new(cache: Arc<EntityCache>, repository: Arc<dyn MentionRepository>) -> Self {
        Self { cache, repository }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub async fn scan(&self, text: &str) -> Vec<Match> {
        self.cache.scan(text).await
    }

    /// Scan `text` and upsert brand then university mentions for `execution_id`.
    pub async fn extract_and_store(
        &self,
        execution_id: ExecutionId,
        text: &str,
    ) -> Result<ExtractionOutcome> {
        let (universities, brands): (Vec<_>, Vec<_>) = self
            .cache
            .scan(text)
            .await
            .into_iter()
            .partition(|m| m.category == Category::University);

        if !brands.is_empty() {
            self.repository
                .upsert_brand_mentions(execution_id, &brands)
                .await
                .with_context(|| format!("storing brand mentions for {execution_id}"))?;
        }
        if !universities.is_empty() {
            self.repository
                .upsert_university_mentions(execution_id, &universities)
                .await
                .with_context(|| format!("storing university mentions for {execution_id}"))?;
        }

        info!(
            %execution_id,
            brands = brands.len(),
            universities = universities.len(),
            "extracted mentions"
        );
        Ok(ExtractionOutcome {
            execution_id,
            brands,
            universities,
        })
    }

    /// Re-run extraction over every stored response, then recompute aggregates.
    ///
    /// A failed response fetch is reported in the summary with nothing
    /// processed. An error on any single response aborts the batch.
    pub async fn reprocess_all(&self, topic: Option<&str>) -> Result<ReprocessSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("reprocess", %run_id, topic = topic.unwrap_or("*"));
        self.reprocess_inner(run_id, topic).instrument(span).await
    }

    async fn reprocess_inner(&self, run_id: Uuid, topic: Option<&str>) -> Result<ReprocessSummary> {
        let started_at = Utc::now();
        let mut summary = ReprocessSummary {
            run_id,
            topic: topic.map(str::to_string),
            started_at,
            finished_at: started_at,
            processed: 0,
            brand_mentions: 0,
            university_mentions: 0,
            error: None,
        };

        let responses = match self.repository.stored_responses(topic).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%err, "fetching stored responses failed");
                summary.error = Some(err.to_string());
                summary.finished_at = Utc::now();
                return Ok(summary);
            }
        };
        info!(responses = responses.len(), "reprocessing stored responses");

        for response in &responses {
            let outcome = self
                .extract_and_store(response.execution_id, &response.response_text)
                .await?;
            summary.processed += 1;
            summary.brand_mentions += outcome.brands.len();
            summary.university_mentions += outcome.universities.len();
        }

        self.repository
            .recompute_aggregates()
            .await
            .context("recomputing mention aggregates")?;

        summary.finished_at = Utc::now();
        info!(
            processed = summary.processed,
            brand_mentions = summary.brand_mentions,
            university_mentions = summary.university_mentions,
            "reprocess complete"
        );
        Ok(summary)
    }
}

/// Postgres-backed pipeline configured from the environment.
pub async fn pipeline_from_env() -> Result<MentionPipeline> {
    let config = ExtractionConfig::from_env();
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    let store = Arc::new(PgStore::connect(&database_url).await?);
    let settings = config.matcher_settings()?;
    Ok(pipeline_with_store(store, settings))
}

/// Wire one store in as both the catalog and the mention repository.
pub fn pipeline_with_store<S>(store: Arc<S>, settings: MatcherSettings) -> MentionPipeline
where
    S: EntityCatalog + MentionRepository + 'static,
{
    let cache = Arc::new(EntityCache::new(store.clone(), settings));
    MentionPipeline::new(cache, store)
}
