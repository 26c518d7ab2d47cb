use rdip_core::traits::AnalysisStore;
use rdip_db::{CacheDbConfig, Database};

use crate::integration::common::{sample_analysis, setup_test_db, setup_test_repo};

#[tokio::test]
async fn upsert_then_load() {
    let repo = setup_test_repo().await;

    repo.upsert("abc123", "https://redd.it/abc", &sample_analysis("Hello"))
        .await
        .unwrap();

    let stored = repo
        .load("abc123")
        .await
        .unwrap()
        .expect("Should find the analysis");

    assert_eq!(stored.url_hash, "abc123");
    assert_eq!(stored.url, "https://redd.it/abc");
    assert_eq!(stored.analysis, sample_analysis("Hello"));
    assert_eq!(stored.access_count, 1);
    assert_eq!(stored.created_at, stored.updated_at);
}

#[tokio::test]
async fn load_missing_returns_none() {
    let repo = setup_test_repo().await;
    assert!(repo.load("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_overwrites_and_increments() {
    let repo = setup_test_repo().await;

    repo.upsert("k", "https://redd.it/a", &sample_analysis("First"))
        .await
        .unwrap();
    let first = repo.load("k").await.unwrap().unwrap();

    repo.upsert("k", "https://redd.it/a", &sample_analysis("Second"))
        .await
        .unwrap();
    let second = repo.load("k").await.unwrap().unwrap();

    assert_eq!(second.analysis["meta"]["title"], "Second");
    assert_eq!(second.access_count, 2);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn concurrent_upserts_count_every_write() {
    let repo = setup_test_repo().await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.upsert("same", "https://redd.it/x", &sample_analysis(&i.to_string()))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_accesses, 10);
}

#[tokio::test]
async fn record_access_bumps_counter() {
    let repo = setup_test_repo().await;
    repo.upsert("k", "u", &sample_analysis("T")).await.unwrap();

    repo.record_access("k").await.unwrap();
    repo.record_access("k").await.unwrap();
    // Unknown keys are a no-op.
    repo.record_access("missing").await.unwrap();

    assert_eq!(repo.load("k").await.unwrap().unwrap().access_count, 3);
    assert!(repo.load("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_reports_whether_a_row_existed() {
    let repo = setup_test_repo().await;
    repo.upsert("k", "u", &sample_analysis("T")).await.unwrap();

    assert!(repo.delete("k").await.unwrap());
    assert!(!repo.delete("k").await.unwrap());
    assert!(repo.load("k").await.unwrap().is_none());
}

#[tokio::test]
async fn stats_on_empty_table() {
    let repo = setup_test_repo().await;
    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.total_accesses, 0);
}

#[tokio::test]
async fn recent_lists_newest_first() {
    let repo = setup_test_repo().await;
    repo.upsert("a", "u1", &sample_analysis("A")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    repo.upsert("b", "u2", &sample_analysis("B")).await.unwrap();

    let recent = repo.recent(10).await.unwrap();
    let keys: Vec<&str> = recent.iter().map(|r| r.url_hash.as_str()).collect();
    assert_eq!(keys, vec!["b", "a"]);
    assert_eq!(repo.recent(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let db = setup_test_db().await;
    db.migrate().await.unwrap();
    db.analysis_repo().ping().await.unwrap();
}

#[tokio::test]
async fn ping_fails_after_close() {
    let repo = setup_test_repo().await;
    repo.ping().await.unwrap();
    repo.close().await;
    assert!(repo.ping().await.is_err());
}

#[tokio::test]
async fn file_database_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let config = CacheDbConfig {
        url: format!("sqlite:{}", path.display()),
        max_connections: 2,
    };

    let db = Database::connect(&config).await.unwrap();
    db.migrate().await.unwrap();
    let repo = db.analysis_repo();
    repo.upsert("k", "u", &sample_analysis("Persisted"))
        .await
        .unwrap();
    repo.close().await;

    let reopened = Database::connect(&config).await.unwrap().analysis_repo();
    let stored = reopened.load("k").await.unwrap().unwrap();
    assert_eq!(stored.analysis["meta"]["title"], "Persisted");
    assert!(path.exists());
}

#[tokio::test]
async fn from_pool_shares_the_connection_pool() {
    let db = setup_test_db().await;
    let shared = Database::from_pool(db.pool().clone());

    db.analysis_repo()
        .upsert("k", "u", &sample_analysis("Shared"))
        .await
        .unwrap();

    let stored = shared.analysis_repo().load("k").await.unwrap().unwrap();
    assert_eq!(stored.url, "u");
}
