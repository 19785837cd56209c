//! Catalog + mention persistence collaborators for the entity matcher.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use mention_core::{BrandRow, EntityId, ExecutionId, Match, StoredResponse, UniversityRow};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub const CRATE_NAME: &str = "mention-storage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Source of the known entity names.
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    async fn fetch_brands(&self) -> StorageResult<Vec<BrandRow>>;

    /// Only universities flagged active.
    async fn fetch_active_universities(&self) -> StorageResult<Vec<UniversityRow>>;
}

/// Destination for extracted mentions and source of previously stored responses.
///
/// Upserts are keyed on `(execution_id, entity_id)` so re-running extraction
/// for the same execution overwrites instead of duplicating.
#[async_trait]
pub trait MentionRepository: Send + Sync {
    async fn upsert_brand_mentions(
        &self,
        execution_id: ExecutionId,
        matches: &[Match],
    ) -> StorageResult<usize>;

    async fn upsert_university_mentions(
        &self,
        execution_id: ExecutionId,
        matches: &[Match],
    ) -> StorageResult<usize>;

    async fn stored_responses(&self, topic: Option<&str>) -> StorageResult<Vec<StoredResponse>>;

    async fn recompute_aggregates(&self) -> StorageResult<()>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn upsert_mentions(
        &self,
        table: MentionTable,
        execution_id: ExecutionId,
        matches: &[Match],
    ) -> StorageResult<usize> {
        if matches.is_empty() {
            return Ok(0);
        }
        let sql = table.upsert_sql();
        let mut tx = self.pool.begin().await?;
        for m in matches {
            sqlx::query(sql)
                .bind(execution_id)
                .bind(m.entity_id)
                .bind(&m.display_name)
                .bind(m.position as i32)
                .bind(&m.context)
                .bind(m.sentiment.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(table = table.name(), %execution_id, rows = matches.len(), "upserted mentions");
        Ok(matches.len())
    }
}

#[derive(Debug, Clone, Copy)]
enum MentionTable {
    Brand,
    University,
}

impl MentionTable {
    fn name(&self) -> &'static str {
        match self {
            MentionTable::Brand => "brand_mentions",
            MentionTable::University => "university_mentions",
        }
    }

    fn upsert_sql(&self) -> &'static str {
        match self {
            MentionTable::Brand => {
                r#"
                INSERT INTO brand_mentions
                    (execution_id, brand_id, mention_name, position, context, sentiment)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (execution_id, brand_id) DO UPDATE
                   SET mention_name = EXCLUDED.mention_name,
                       position = EXCLUDED.position,
                       context = EXCLUDED.context,
                       sentiment = EXCLUDED.sentiment,
                       updated_at = NOW()
                "#
            }
            MentionTable::University => {
                r#"
                INSERT INTO university_mentions
                    (execution_id, university_id, mention_name, position, context, sentiment)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (execution_id, university_id) DO UPDATE
                   SET mention_name = EXCLUDED.mention_name,
                       position = EXCLUDED.position,
                       context = EXCLUDED.context,
                       sentiment = EXCLUDED.sentiment,
                       updated_at = NOW()
                "#
            }
        }
    }
}

#[async_trait]
impl EntityCatalog for PgStore {
    async fn fetch_brands(&self) -> StorageResult<Vec<BrandRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, brand_name, slug
              FROM brands
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(BrandRow {
                id: row.try_get("id")?,
                brand_name: row.try_get("brand_name")?,
                slug: row.try_get("slug")?,
            });
        }
        Ok(out)
    }

    async fn fetch_active_universities(&self) -> StorageResult<Vec<UniversityRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, short_name, slug
              FROM universities
             WHERE is_active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(UniversityRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                short_name: row.try_get("short_name")?,
                slug: row.try_get("slug")?,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl MentionRepository for PgStore {
    async fn upsert_brand_mentions(
        &self,
        execution_id: ExecutionId,
        matches: &[Match],
    ) -> StorageResult<usize> {
        self.upsert_mentions(MentionTable::Brand, execution_id, matches)
            .await
    }

    async fn upsert_university_mentions(
        &self,
        execution_id: ExecutionId,
        matches: &[Match],
    ) -> StorageResult<usize> {
        self.upsert_mentions(MentionTable::University, execution_id, matches)
            .await
    }

    async fn stored_responses(&self, topic: Option<&str>) -> StorageResult<Vec<StoredResponse>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id AS execution_id, e.response_text
              FROM prompt_executions e
              JOIN prompts p ON p.id = e.prompt_id
             WHERE e.response_text IS NOT NULL
               AND ($1::text IS NULL OR p.topic = $1)
             ORDER BY e.created_at
            "#,
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(StoredResponse {
                execution_id: row.try_get("execution_id")?,
                response_text: row.try_get("response_text")?,
            });
        }
        Ok(out)
    }

    async fn recompute_aggregates(&self) -> StorageResult<()> {
        sqlx::query("SELECT recompute_mention_aggregates()")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Offline catalog/response seed, loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFixture {
    #[serde(default)]
    pub brands: Vec<BrandRow>,
    #[serde(default)]
    pub universities: Vec<UniversityRow>,
    #[serde(default)]
    pub responses: Vec<FixtureResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureResponse {
    pub execution_id: ExecutionId,
    #[serde(default)]
    pub topic: Option<String>,
    pub response_text: String,
}

pub async fn load_catalog_fixture(path: impl AsRef<Path>) -> anyhow::Result<CatalogFixture> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Default)]
struct MemoryState {
    brands: Vec<BrandRow>,
    universities: Vec<UniversityRow>,
    responses: Vec<FixtureResponse>,
    brand_mentions: BTreeMap<(ExecutionId, EntityId), Match>,
    university_mentions: BTreeMap<(ExecutionId, EntityId), Match>,
}

/// In-process store used by tests and fixture-driven CLI runs.
///
/// Counts catalog fetches and can be told to fail individual calls.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    brand_fetches: AtomicUsize,
    university_fetches: AtomicUsize,
    recomputes: AtomicUsize,
    fail_brands: AtomicBool,
    fail_universities: AtomicBool,
    fail_responses: AtomicBool,
    fail_upserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: CatalogFixture) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                brands: fixture.brands,
                universities: fixture.universities,
                responses: fixture.responses,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub async fn set_brands(&self, brands: Vec<BrandRow>) {
        self.state.lock().await.brands = brands;
    }

    pub async fn set_universities(&self, universities: Vec<UniversityRow>) {
        self.state.lock().await.universities = universities;
    }

    pub async fn add_response(&self, response: FixtureResponse) {
        self.state.lock().await.responses.push(response);
    }

    pub fn fail_brand_fetches(&self, fail: bool) {
        self.fail_brands.store(fail, Ordering::SeqCst);
    }

    pub fn fail_university_fetches(&self, fail: bool) {
        self.fail_universities.store(fail, Ordering::SeqCst);
    }

    pub fn fail_response_fetches(&self, fail: bool) {
        self.fail_responses.store(fail, Ordering::SeqCst);
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Number of brand catalog fetches; one per cache reload.
    pub fn brand_fetch_count(&self) -> usize {
        self.brand_fetches.load(Ordering::SeqCst)
    }

    pub fn university_fetch_count(&self) -> usize {
        self.university_fetches.load(Ordering::SeqCst)
    }

    pub fn recompute_count(&self) -> usize {
        self.recomputes.load(Ordering::SeqCst)
    }

    pub async fn brand_mentions(&self) -> Vec<(ExecutionId, Match)> {
        let state = self.state.lock().await;
        state
            .brand_mentions
            .iter()
            .map(|((execution_id, _), m)| (*execution_id, m.clone()))
            .collect()
    }

    pub async fn university_mentions(&self) -> Vec<(ExecutionId, Match)> {
        let state = self.state.lock().await;
        state
            .university_mentions
            .iter()
            .map(|((execution_id, _), m)| (*execution_id, m.clone()))
            .collect()
    }

    fn check_upsert(&self) -> StorageResult<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("mention upsert rejected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityCatalog for MemoryStore {
    async fn fetch_brands(&self) -> StorageResult<Vec<BrandRow>> {
        self.brand_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_brands.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("brand catalog unavailable".into()));
        }
        Ok(self.state.lock().await.brands.clone())
    }

    async fn fetch_active_universities(&self) -> StorageResult<Vec<UniversityRow>> {
        self.university_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_universities.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "university catalog unavailable".into(),
            ));
        }
        Ok(self.state.lock().await.universities.clone())
    }
}

#[async_trait]
impl MentionRepository for MemoryStore {
    async fn upsert_brand_mentions(
        &self,
        execution_id: ExecutionId,
        matches: &[Match],
    ) -> StorageResult<usize> {
        self.check_upsert()?;
        let mut state = self.state.lock().await;
        for m in matches {
            state
                .brand_mentions
                .insert((execution_id, m.entity_id), m.clone());
        }
        Ok(matches.len())
    }

    async fn upsert_university_mentions(
        &self,
        execution_id: ExecutionId,
        matches: &[Match],
    ) -> StorageResult<usize> {
        self.check_upsert()?;
        let mut state = self.state.lock().await;
        for m in matches {
            state
                .university_mentions
                .insert((execution_id, m.entity_id), m.clone());
        }
        Ok(matches.len())
    }

    async fn stored_responses(&self, topic: Option<&str>) -> StorageResult<Vec<StoredResponse>> {
        if self.fail_responses.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "prompt executions unavailable".into(),
            ));
        }
        let state = self.state.lock().await;
        Ok(state
            .responses
            .iter()
            .filter(|r| topic.is_none() || r.topic.as_deref() == topic)
            .map(|r| StoredResponse {
                execution_id: r.execution_id,
                response_text: r.response_text.clone(),
            })
            .collect())
    }

    async fn recompute_aggregates(&self) -> StorageResult<()> {
        self.recomputes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
