use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use mention_core::{BrandRow, Category, Clock, ManualClock, UniversityRow};
use mention_matcher::{CategoryReload, EntityCache, MatcherSettings};
use mention_storage::MemoryStore;
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap()
}

fn brand(id: u128, name: &str, slug: Option<&str>) -> BrandRow {
    BrandRow {
        id: Uuid::from_u128(id),
        brand_name: name.to_string(),
        slug: slug.map(str::to_string),
    }
}

fn university(id: u128, name: &str, short_name: Option<&str>, slug: Option<&str>) -> UniversityRow {
    UniversityRow {
        id: Uuid::from_u128(id),
        name: name.to_string(),
        short_name: short_name.map(str::to_string),
        slug: slug.map(str::to_string),
    }
}

async fn fixture(
    brands: Vec<BrandRow>,
    universities: Vec<UniversityRow>,
) -> (Arc<MemoryStore>, Arc<ManualClock>, EntityCache) {
    let store = Arc::new(MemoryStore::new());
    store.set_brands(brands).await;
    store.set_universities(universities).await;
    let clock = Arc::new(ManualClock::new(t0()));
    let cache = EntityCache::new(store.clone(), MatcherSettings::default()).with_clock(clock.clone());
    (store, clock, cache)
}

#[tokio::test]
async fn canonical_name_yields_exactly_one_match() {
    let (_store, _clock, cache) = fixture(vec![brand(1, "HubSpot", None)], vec![]).await;
    let matches = cache.scan("Many teams pick HubSpot for inbound marketing.").await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].entity_id, Uuid::from_u128(1));
    assert_eq!(matches[0].display_name, "HubSpot");
    assert_eq!(matches[0].category, Category::Brand);
    assert_eq!(matches[0].position, 1);
}

#[tokio::test]
async fn partial_word_does_not_match() {
    let (_store, _clock, cache) = fixture(vec![brand(1, "Kong", None)], vec![]).await;
    assert!(cache.scan("The Kongo river basin").await.is_empty());
}

#[tokio::test]
async fn repeated_aliases_report_entity_once() {
    let (_store, _clock, cache) = fixture(
        vec![brand(1, "Monday.com", Some("monday-com"))],
        vec![],
    )
    .await;
    let matches = cache
        .scan("Monday.com (aka monday-com, or mondaycom) beats spreadsheets. Monday.com again.")
        .await;
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn universities_rank_before_brands_regardless_of_text_order() {
    let (_store, _clock, cache) = fixture(
        vec![brand(1, "Coursera", None)],
        vec![university(2, "Stanford University", Some("Stanford"), None)],
    )
    .await;
    let matches = cache
        .scan("Coursera hosts courses taught by Stanford University faculty.")
        .await;
    assert_eq!(matches.len(), 2);
    let uni = matches.iter().find(|m| m.category == Category::University).unwrap();
    let brand = matches.iter().find(|m| m.category == Category::Brand).unwrap();
    assert!(uni.position < brand.position);
    assert_eq!(matches[0].category, Category::University);
}

#[tokio::test]
async fn longer_keys_are_tried_first() {
    let (_store, _clock, cache) = fixture(
        vec![],
        vec![
            university(1, "York University", None, None),
            university(2, "New York University", Some("NYU"), None),
        ],
    )
    .await;
    let matches = cache
        .scan("York University and New York University both offer MBAs.")
        .await;
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].entity_id, Uuid::from_u128(2));
    assert_eq!(matches[0].position, 1);
    assert_eq!(matches[1].entity_id, Uuid::from_u128(1));
    assert_eq!(matches[1].position, 2);
}

#[tokio::test]
async fn repeated_scans_are_identical() {
    let (_store, _clock, cache) = fixture(
        vec![brand(1, "Salesforce", None), brand(2, "Zoho", None)],
        vec![university(3, "Harvard University", Some("Harvard"), None)],
    )
    .await;
    let text = "Harvard alumni often choose Salesforce, the best CRM, over Zoho.";
    let first = cache.scan(text).await;
    let second = cache.scan(text).await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn reload_happens_once_per_ttl_window() {
    let (store, clock, cache) = fixture(vec![brand(1, "Asana", None)], vec![]).await;

    cache.scan("Asana").await;
    assert_eq!(store.brand_fetch_count(), 1);

    clock.advance(Duration::minutes(4));
    cache.scan("Asana").await;
    cache.scan("Asana").await;
    assert_eq!(store.brand_fetch_count(), 1);

    clock.advance(Duration::minutes(1));
    cache.scan("Asana").await;
    assert_eq!(store.brand_fetch_count(), 2);
    assert_eq!(store.university_fetch_count(), 2);

    cache.scan("Asana").await;
    assert_eq!(store.brand_fetch_count(), 2);
}

#[tokio::test]
async fn stoplisted_brand_is_never_matched() {
    let (_store, _clock, cache) = fixture(vec![brand(1, "Close", Some("close"))], vec![]).await;
    assert!(cache.scan("Close the deal with a CRM.").await.is_empty());
}

#[tokio::test]
async fn short_university_keys_are_ignored_but_short_brands_are_not() {
    let (_store, _clock, cache) = fixture(
        vec![brand(1, "HP", None)],
        vec![university(2, "University of California", Some("UC"), None)],
    )
    .await;
    let matches = cache.scan("UC labs run on HP workstations.").await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].entity_id, Uuid::from_u128(1));
}

#[tokio::test]
async fn abbreviation_matches_on_word_boundary_only() {
    let (_store, _clock, cache) = fixture(
        vec![brand(1, "It", None)],
        vec![university(
            2,
            "Massachusetts Institute of Technology",
            Some("MIT"),
            Some("mit"),
        )],
    )
    .await;

    let matches = cache.scan("MIT students submit work daily").await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].display_name, "Massachusetts Institute of Technology");
    assert_eq!(matches[0].category, Category::University);

    let matches = cache.scan("MIT students use IT support daily").await;
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[1].entity_id, Uuid::from_u128(1));
    assert_eq!(matches[1].position, 2);
}

#[tokio::test]
async fn match_at_text_start_has_no_leading_ellipsis() {
    let (_store, _clock, cache) = fixture(vec![brand(1, "Notion", None)], vec![]).await;
    let tail = " is a flexible workspace".repeat(10);
    let matches = cache.scan(&format!("Notion{tail}")).await;
    assert_eq!(matches.len(), 1);
    assert!(matches[0].context.starts_with("Notion"));
    assert!(matches[0].context.ends_with("..."));
}

#[tokio::test]
async fn context_sentiment_is_classified_per_match() {
    let (_store, _clock, cache) = fixture(vec![brand(1, "Pipedrive", None)], vec![]).await;
    let matches = cache
        .scan("Pipedrive is the best and most innovative platform")
        .await;
    assert_eq!(matches[0].sentiment, mention_core::Sentiment::Positive);
}

#[tokio::test]
async fn failed_reload_keeps_previous_entries() {
    let (store, clock, cache) = fixture(
        vec![brand(1, "Airtable", None)],
        vec![university(2, "Yale University", Some("Yale"), None)],
    )
    .await;
    assert_eq!(cache.scan("Yale uses Airtable").await.len(), 2);

    store.fail_brand_fetches(true);
    store.set_universities(vec![]).await;
    clock.advance(Duration::minutes(6));

    let outcome = cache.reload(clock.now()).await;
    assert!(matches!(outcome.brands, CategoryReload::KeptFailed { .. }));
    assert_eq!(outcome.universities, CategoryReload::KeptEmpty);
    assert_eq!(cache.scan("Yale uses Airtable").await.len(), 2);
}

#[tokio::test]
async fn cold_start_failure_scans_empty_and_retries() {
    let (store, _clock, cache) = fixture(vec![brand(1, "Airtable", None)], vec![]).await;
    store.fail_brand_fetches(true);
    store.fail_university_fetches(true);

    assert!(cache.scan("Airtable").await.is_empty());
    assert_eq!(cache.stats().await.loaded_at, None);

    store.fail_brand_fetches(false);
    store.fail_university_fetches(false);
    assert_eq!(cache.scan("Airtable").await.len(), 1);
    assert_eq!(store.brand_fetch_count(), 2);
}

#[tokio::test]
async fn renamed_entity_disappears_after_reload() {
    let (store, clock, cache) = fixture(vec![brand(1, "Freshsales", None)], vec![]).await;
    assert_eq!(cache.scan("Freshsales").await.len(), 1);

    store.set_brands(vec![brand(1, "Freshworks CRM", None)]).await;
    clock.advance(Duration::minutes(5));
    assert!(cache.scan("Freshsales").await.is_empty());
    assert_eq!(cache.scan("Freshworks CRM").await.len(), 1);
}

#[tokio::test]
async fn simplified_key_collision_resolves_to_last_loaded() {
    let (_store, _clock, cache) = fixture(
        vec![brand(1, "Acme Co", None), brand(2, "Acme-Co", None)],
        vec![],
    )
    .await;
    let matches = cache.scan("We migrated to acmeco last year").await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].entity_id, Uuid::from_u128(2));
}

#[tokio::test]
async fn empty_text_has_no_matches() {
    let (_store, _clock, cache) = fixture(vec![brand(1, "Asana", None)], vec![]).await;
    assert!(cache.scan("").await.is_empty());
}

#[tokio::test]
async fn name_with_expanding_lowercase_still_matches() {
    let (_store, _clock, cache) = fixture(
        vec![],
        vec![university(1, "İstanbul Teknik Üniversitesi", Some("İTÜ"), None)],
    )
    .await;
    let matches = cache.scan("İstanbul Teknik Üniversitesi is excellent.").await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].display_name, "İstanbul Teknik Üniversitesi");
    assert_eq!(matches[0].context, "İstanbul Teknik Üniversitesi is excellent.");
}
