use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tower::ServiceExt;

use rdip_client::RedditExtractor;
use rdip_core::Settings;
use rdip_db::{CacheDbConfig, Database};
use rdip_server::routes;
use rdip_server::state::AppState;

/// Nothing listens here, so extraction fails fast.
const UNREACHABLE_BASE: &str = "http://127.0.0.1:1";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Router over an in-memory cache database, with no LLM credentials and an
/// extractor pointed at a closed port.
pub async fn setup_test_app() -> TestApp {
    let db = Database::connect(&CacheDbConfig::in_memory())
        .await
        .expect("Failed to open in-memory database");
    db.migrate().await.expect("Failed to run migrations");

    let settings = Settings::default();
    let extractor = RedditExtractor::with_timeout(&settings.user_agent, Duration::from_secs(2))
        .expect("Failed to build extractor")
        .with_base_url(UNREACHABLE_BASE);

    let state = Arc::new(
        AppState::with_extractor(&settings, &db, extractor).expect("Failed to build state"),
    );

    TestApp {
        router: routes::router(state.clone()),
        state,
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}
