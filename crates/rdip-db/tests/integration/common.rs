use rdip_db::{AnalysisRepository, CacheDbConfig, Database};

/// Opens a migrated in-memory database.
///
/// Each call gets its own database; nothing is shared between tests.
pub async fn setup_test_db() -> Database {
    let db = Database::connect(&CacheDbConfig::in_memory())
        .await
        .expect("Failed to open in-memory database");
    db.migrate().await.expect("Failed to run migrations");
    db
}

pub async fn setup_test_repo() -> AnalysisRepository {
    setup_test_db().await.analysis_repo()
}

pub fn sample_analysis(title: &str) -> serde_json::Value {
    serde_json::json!({
        "meta": {"title": title, "subreddit": "rust"},
        "summary_post": "A post about Rust",
        "sentiment_post": {"label": "Positive", "score": 0.8, "details": ""},
        "useful_links": []
    })
}
