use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rdip_core::cache::CacheStats;
use rdip_core::job::{AnalyzeRequest, JobRecord};
use rdip_core::job_store::JobStats;
use rdip_core::models::{EnrichedLink, LinkCandidate};
use rdip_core::pipeline::{HealthReport, ServiceStats};
use rdip_core::rate_limit::ProviderUsage;

// ---------------------------------------------------------------------------
// Analysis jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AnalyzeRequestBody {
    /// Thread URL (reddit.com, old.reddit.com, redd.it or share link)
    pub url: String,
    /// Ignore any cached analysis
    #[serde(default)]
    pub force_refresh: bool,
    /// Pull a larger slice of the comment tree
    #[serde(default)]
    pub deep_scan: bool,
    /// Truncate content to keep prompts small
    #[serde(default)]
    pub lite_mode: bool,
}

impl From<AnalyzeRequestBody> for AnalyzeRequest {
    fn from(body: AnalyzeRequestBody) -> Self {
        AnalyzeRequest::new(body.url)
            .with_force_refresh(body.force_refresh)
            .with_deep_scan(body.deep_scan)
            .with_lite_mode(body.lite_mode)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    /// Job identifier, or `"cache"` for an answer served from the cache
    pub job_id: String,
    pub status: String,
    /// 0 to 100
    pub progress: u8,
    /// Present once the job is completed
    pub result: Option<serde_json::Value>,
    /// Present once the job has failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<JobRecord> for JobResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status.to_string(),
            progress: job.progress,
            result: job.result.and_then(|r| serde_json::to_value(r).ok()),
            error: job.error,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LinkInput {
    pub url: String,
    #[serde(rename = "type", default)]
    pub link_type: String,
    #[serde(default)]
    pub context: String,
}

impl From<LinkInput> for LinkCandidate {
    fn from(link: LinkInput) -> Self {
        LinkCandidate {
            url: link.url,
            link_type: link.link_type,
            context: link.context,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct EnrichLinksRequest {
    /// At most 20 links
    pub links: Vec<LinkInput>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnrichedLinkResponse {
    pub url: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub link_type: String,
    pub context: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon: Option<String>,
    pub relevance: f64,
}

impl From<EnrichedLink> for EnrichedLinkResponse {
    fn from(link: EnrichedLink) -> Self {
        Self {
            url: link.url,
            domain: link.domain,
            link_type: link.link_type,
            context: link.context,
            title: link.title,
            description: link.description,
            favicon: link.favicon,
            relevance: link.relevance,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnrichLinksResponse {
    pub links: Vec<EnrichedLinkResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct InvalidateQuery {
    /// Thread URL whose cached analysis should be dropped
    pub url: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InvalidateResponse {
    pub url: String,
    /// False when nothing was cached for this URL
    pub removed: bool,
}

// ---------------------------------------------------------------------------
// Health & stats
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatsResponse {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl From<JobStats> for JobStatsResponse {
    fn from(s: JobStats) -> Self {
        Self {
            queued: s.queued,
            processing: s.processing,
            completed: s.completed,
            failed: s.failed,
            total: s.total,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CacheStatsResponse {
    pub hot_entries: u64,
    pub hot_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    /// Entries in the durable tier, absent when it could not be queried
    pub durable_entries: Option<i64>,
    pub durable_accesses: Option<i64>,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(s: CacheStats) -> Self {
        Self {
            hot_entries: s.hot_entries,
            hot_hits: s.hot_hits,
            durable_hits: s.durable_hits,
            misses: s.misses,
            durable_entries: s.durable.map(|d| d.entries),
            durable_accesses: s.durable.map(|d| d.total_accesses),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProviderUsageResponse {
    pub provider: String,
    pub used: u32,
    pub limit: u32,
    pub available: u32,
}

impl From<ProviderUsage> for ProviderUsageResponse {
    fn from(u: ProviderUsage) -> Self {
        Self {
            provider: u.provider.to_string(),
            used: u.used,
            limit: u.limit,
            available: u.available,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    pub jobs: JobStatsResponse,
    pub cache: CacheStatsResponse,
    pub rate_limits: Vec<ProviderUsageResponse>,
}

impl From<ServiceStats> for StatsResponse {
    fn from(s: ServiceStats) -> Self {
        Self {
            jobs: s.jobs.into(),
            cache: s.cache.into(),
            rate_limits: s.rate_limits.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    /// `ok` or `unreachable`
    pub durable_cache: String,
    /// Providers with credentials configured, primary first
    pub providers: Vec<String>,
    pub jobs_active: usize,
    pub cache: CacheStatsResponse,
    pub rate_limits: Vec<ProviderUsageResponse>,
}

impl From<HealthReport> for HealthResponse {
    fn from(h: HealthReport) -> Self {
        Self {
            status: if h.healthy { "healthy" } else { "degraded" }.to_string(),
            durable_cache: if h.durable_cache { "ok" } else { "unreachable" }.to_string(),
            providers: h.providers.iter().map(ToString::to_string).collect(),
            jobs_active: h.jobs_active,
            cache: h.cache.into(),
            rate_limits: h.rate_limits.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
