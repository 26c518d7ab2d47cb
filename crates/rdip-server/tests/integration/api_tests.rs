use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use rdip_core::testutil::make_test_result;

use crate::integration::common::{body_json, json_request, setup_test_app};

const THREAD_URL: &str = "https://www.reddit.com/r/rust/comments/abc123/hello";

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .send(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["durable_cache"], "ok");
    assert_eq!(json["providers"], json!([]));
    assert_eq!(json["jobs_active"], 0);
}

#[tokio::test]
async fn health_degrades_when_cache_database_is_closed() {
    let app = setup_test_app().await;
    app.state.service.cache().close().await;

    let response = app
        .send(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["durable_cache"], "unreachable");
}

#[tokio::test]
async fn stats_report_rate_limits_for_both_providers() {
    let app = setup_test_app().await;

    let response = app
        .send(Request::get("/v1/stats").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["jobs"]["total"], 0);
    assert_eq!(json["cache"]["durable_entries"], 0);

    let limits = json["rate_limits"].as_array().unwrap();
    assert_eq!(limits.len(), 2);
    assert_eq!(limits[0]["provider"], "groq");
    assert_eq!(limits[0]["limit"], 150);
    assert_eq!(limits[0]["used"], 0);
    assert_eq!(limits[1]["provider"], "gemini");
}

#[tokio::test]
async fn analyze_rejects_non_thread_url() {
    let app = setup_test_app().await;

    let response = app
        .send(json_request(
            "POST",
            "/v1/analyze",
            json!({"url": "https://example.com/not-a-thread"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn analyze_serves_cached_result() {
    let app = setup_test_app().await;
    app.state
        .service
        .cache()
        .save(THREAD_URL, &make_test_result("Hello"))
        .await;

    let response = app
        .send(json_request("POST", "/v1/analyze", json!({"url": THREAD_URL})))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["job_id"], "cache");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["progress"], 100);
    assert_eq!(json["result"]["meta"]["title"], "Hello");
}

#[tokio::test]
async fn queued_job_fails_when_thread_is_unreachable() {
    let app = setup_test_app().await;

    let response = app
        .send(json_request(
            "POST",
            "/v1/analyze",
            json!({"url": THREAD_URL, "lite_mode": true}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "queued");
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let mut last = serde_json::Value::Null;
    for _ in 0..100 {
        let response = app
            .send(
                Request::get(format!("/v1/status/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        last = body_json(response).await;
        if last["status"] == "failed" || last["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(last["status"], "failed");
    let error = last["error"].as_str().unwrap();
    assert!(!error.is_empty());
    assert!(error.chars().count() <= 200);
    assert!(last["result"].is_null());

    let response = app
        .send(
            Request::get("/v1/jobs?status=failed")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["jobs"][0]["job_id"], job_id.as_str());
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let app = setup_test_app().await;

    let response = app
        .send(
            Request::get("/v1/status/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn list_jobs_rejects_unknown_status() {
    let app = setup_test_app().await;

    let response = app
        .send(
            Request::get("/v1/jobs?status=sleeping")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enrich_links_rejects_more_than_twenty() {
    let app = setup_test_app().await;
    let links: Vec<_> = (0..21)
        .map(|i| json!({"url": format!("https://example.com/{i}.png"), "type": "image"}))
        .collect();

    let response = app
        .send(json_request("POST", "/v1/enrich-links", json!({"links": links})))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enrich_links_returns_records_without_fetching_images() {
    let app = setup_test_app().await;

    let response = app
        .send(json_request(
            "POST",
            "/v1/enrich-links",
            json!({"links": [
                {"url": "https://example.com/cat.png", "type": "Image", "context": "a cat"},
            ]}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    let link = &json["links"][0];
    assert_eq!(link["domain"], "example.com");
    assert_eq!(link["type"], "Image");
    assert!(link["title"].is_null());
}

#[tokio::test]
async fn enrich_links_accepts_empty_list() {
    let app = setup_test_app().await;

    let response = app
        .send(json_request("POST", "/v1/enrich-links", json!({"links": []})))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total"], 0);
}

#[tokio::test]
async fn invalidate_drops_cached_analysis() {
    let app = setup_test_app().await;
    app.state
        .service
        .cache()
        .save(THREAD_URL, &make_test_result("Hello"))
        .await;

    let uri = format!("/v1/cache?url={THREAD_URL}");
    let response = app
        .send(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["removed"], true);

    let response = app
        .send(Request::delete(uri.as_str()).body(Body::empty()).unwrap())
        .await;
    assert_eq!(body_json(response).await["removed"], false);
}
