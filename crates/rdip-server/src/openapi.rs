use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "rdip API",
        version = "0.3.0",
        description = "Discussion thread analysis: summaries, sentiment, consensus and useful links."
    ),
    paths(
        crate::routes::analyze,
        crate::routes::get_status,
        crate::routes::list_jobs,
        crate::routes::enrich_links,
        crate::routes::invalidate_cache,
        crate::routes::health,
        crate::routes::stats,
    ),
    components(schemas(
        crate::dto::AnalyzeRequestBody,
        crate::dto::JobResponse,
        crate::dto::JobListResponse,
        crate::dto::LinkInput,
        crate::dto::EnrichLinksRequest,
        crate::dto::EnrichedLinkResponse,
        crate::dto::EnrichLinksResponse,
        crate::dto::InvalidateResponse,
        crate::dto::JobStatsResponse,
        crate::dto::CacheStatsResponse,
        crate::dto::ProviderUsageResponse,
        crate::dto::StatsResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "analysis", description = "Thread analysis jobs"),
        (name = "links", description = "Link enrichment"),
        (name = "cache", description = "Analysis cache"),
        (name = "system", description = "Health and usage statistics"),
    )
)]
pub struct ApiDoc;
