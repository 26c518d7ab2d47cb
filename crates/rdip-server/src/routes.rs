use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rdip_core::error::AppError;
use rdip_core::job::{AnalyzeRequest, JobStatus};
use rdip_core::models::LinkCandidate;

use crate::dto::{
    AnalyzeRequestBody, EnrichLinksRequest, EnrichLinksResponse, EnrichedLinkResponse,
    ErrorResponse, HealthResponse, InvalidateQuery, InvalidateResponse, JobListResponse,
    JobResponse, ListJobsQuery, StatsResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Request bodies above this size are rejected before deserialization.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/analyze", post(analyze))
        .route("/v1/status/{job_id}", get(get_status))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/enrich-links", post(enrich_links))
        .route("/v1/cache", delete(invalidate_cache))
        .route("/v1/health", get(health))
        .route("/v1/stats", get(stats))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    let docs = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi());

    Router::new().merge(docs).merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/analyze",
    request_body = AnalyzeRequestBody,
    responses(
        (status = 200, description = "Served from the cache", body = JobResponse),
        (status = 202, description = "Job queued", body = JobResponse),
        (status = 400, description = "Invalid thread URL", body = ErrorResponse),
    ),
    tag = "analysis"
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<AnalyzeRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.service.submit(AnalyzeRequest::from(body)).await?;

    let status = if job.status == JobStatus::Completed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };

    Ok((status, axum::Json(JobResponse::from(job))))
}

#[utoipa::path(
    get,
    path = "/v1/status/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID returned by /v1/analyze")
    ),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 404, description = "Unknown or expired job", body = ErrorResponse),
    ),
    tag = "analysis"
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.status(&job_id) {
        Some(job) => Ok(axum::Json(JobResponse::from(job)).into_response()),
        None => {
            let body = ErrorResponse {
                error: "not_found".to_string(),
                message: format!("Job not found: {job_id}"),
            };
            Ok((StatusCode::NOT_FOUND, axum::Json(body)).into_response())
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "Tracked jobs, newest first", body = JobListResponse),
        (status = 400, description = "Unknown status filter", body = ErrorResponse),
    ),
    tag = "analysis"
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = query
        .status
        .map(|s| s.parse().map_err(|e: String| AppError::InvalidInput(e)))
        .transpose()?;

    let limit = query.limit.unwrap_or(20).min(100);
    let jobs = state.service.list_jobs(status_filter, limit);
    let total = jobs.len();

    let response = JobListResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/enrich-links",
    request_body = EnrichLinksRequest,
    responses(
        (status = 200, description = "Enriched links, most relevant first", body = EnrichLinksResponse),
        (status = 400, description = "More than 20 links", body = ErrorResponse),
    ),
    tag = "links"
)]
pub async fn enrich_links(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<EnrichLinksRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let candidates: Vec<LinkCandidate> = body.links.into_iter().map(Into::into).collect();
    let links = state.service.enrich_links(&candidates).await?;
    let total = links.len();

    let response = EnrichLinksResponse {
        links: links.into_iter().map(EnrichedLinkResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/v1/cache",
    params(InvalidateQuery),
    responses(
        (status = 200, description = "Cache entry dropped (or absent)", body = InvalidateResponse),
    ),
    tag = "cache"
)]
pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InvalidateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.service.invalidate(&query.url).await;
    Ok(axum::Json(InvalidateResponse {
        url: query.url,
        removed,
    }))
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Durable cache unreachable", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.service.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, axum::Json(HealthResponse::from(report)))
}

#[utoipa::path(
    get,
    path = "/v1/stats",
    responses(
        (status = 200, description = "Job, cache and rate-limit usage", body = StatsResponse),
    ),
    tag = "system"
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(StatsResponse::from(state.service.stats().await))
}
