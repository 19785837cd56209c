// Runs the bundled catalog fixture through the full reprocess pipeline.

use std::path::Path;
use std::sync::Arc;

use mention_core::Category;
use mention_matcher::MatcherSettings;
use mention_storage::{load_catalog_fixture, MemoryStore};
use mention_sync::pipeline_with_store;

#[tokio::test]
async fn bundled_fixture_reprocesses_end_to_end() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let fixture = load_catalog_fixture(root.join("fixtures/catalog.json"))
        .await
        .expect("fixture");
    let store = Arc::new(MemoryStore::from_fixture(fixture));
    let pipeline = pipeline_with_store(store.clone(), MatcherSettings::default());

    let summary = pipeline.reprocess_all(None).await.expect("reprocess");
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.brand_mentions, 2);
    assert_eq!(summary.university_mentions, 2);

    let brands: Vec<_> = store
        .brand_mentions()
        .await
        .into_iter()
        .map(|(_, m)| m.display_name)
        .collect();
    assert!(brands.contains(&"HubSpot".to_string()));
    assert!(!brands.contains(&"Close".to_string()));

    let universities = store.university_mentions().await;
    let stanford = universities
        .iter()
        .find(|(_, m)| m.display_name == "Stanford University")
        .expect("stanford");
    assert_eq!(stanford.1.category, Category::University);
    assert_eq!(stanford.1.position, 1);
}
