//! Job submission and the analysis pipeline.
//!
//! A submission is either answered from the cache or turned into a queued job
//! whose pipeline runs on its own task:
//!
//! 1. Extract the thread
//! 2. Analyze it with an LLM
//! 3. Enrich the links the model flagged
//! 4. Assemble the result
//! 5. Save it to the cache
//!
//! The job record is advanced at each milestone and finishes either
//! `completed` with a result or `failed` with a bounded error message.

use std::any::Any;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::cache::{AnalysisCache, CacheStats};
use crate::error::{AppError, truncate_chars};
use crate::job::{AnalyzeRequest, JobRecord, JobStatus, PipelineConfig, Stage};
use crate::job_store::{JobStats, JobTracker};
use crate::models::{
    AnalysisResult, EnrichedLink, ExtractOptions, LinkCandidate, Provider, link_candidates,
};
use crate::orchestrator::LlmOrchestrator;
use crate::rate_limit::ProviderUsage;
use crate::traits::{AnalysisStore, LinkEnricher, LlmProvider, ThreadExtractor};
use crate::util::validate_thread_url;

/// Maximum number of links accepted by one enrichment request.
pub const MAX_ENRICH_LINKS: usize = 20;

/// Characters of detail kept after the "Unexpected error: " prefix.
const UNEXPECTED_DETAIL_LEN: usize = 180;

/// Events emitted by the pipeline for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    CacheHit { url: &'a str },
    JobQueued { job_id: &'a str, url: &'a str },
    StageReached { job_id: &'a str, stage: Stage },
    JobCompleted { job_id: &'a str },
    JobFailed { job_id: &'a str, error: &'a str },
    ShuttingDown { jobs_remaining: usize },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPipelineReporter;

impl PipelineReporter for TracingPipelineReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::CacheHit { url } => {
                tracing::info!(%url, "Cache hit");
            }
            PipelineEvent::JobQueued { job_id, url } => {
                tracing::info!(%job_id, %url, "Job queued");
            }
            PipelineEvent::StageReached { job_id, stage } => {
                tracing::info!(%job_id, %stage, progress = stage.progress(), "Stage reached");
            }
            PipelineEvent::JobCompleted { job_id } => {
                tracing::info!(%job_id, "Analysis completed");
            }
            PipelineEvent::JobFailed { job_id, error } => {
                tracing::warn!(%job_id, %error, "Analysis failed");
            }
            PipelineEvent::ShuttingDown { jobs_remaining } => {
                tracing::info!(%jobs_remaining, "Pipeline shutting down");
            }
        }
    }
}

/// Job counts, cache usage and rate-limit usage in one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub jobs: JobStats,
    pub cache: CacheStats,
    pub rate_limits: Vec<ProviderUsage>,
}

/// Liveness of the service and its dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// False when the durable cache tier is unreachable.
    pub healthy: bool,
    pub providers: Vec<Provider>,
    pub durable_cache: bool,
    pub jobs_active: usize,
    pub cache: CacheStats,
    pub rate_limits: Vec<ProviderUsage>,
}

/// Accepts analysis requests and drives each job to a terminal state.
///
/// Generic over every collaborator, enabling dependency injection and
/// testability without network access.
#[derive(Clone)]
pub struct AnalysisService<E, L, P, S, D>
where
    E: ThreadExtractor,
    L: LinkEnricher,
    P: LlmProvider,
    S: LlmProvider,
    D: AnalysisStore,
{
    extractor: E,
    enricher: L,
    orchestrator: LlmOrchestrator<P, S>,
    cache: AnalysisCache<D>,
    jobs: JobTracker,
    reporter: Arc<dyn PipelineReporter>,
    config: PipelineConfig,
}

impl<E, L, P, S, D> AnalysisService<E, L, P, S, D>
where
    E: ThreadExtractor + 'static,
    L: LinkEnricher + 'static,
    P: LlmProvider + 'static,
    S: LlmProvider + 'static,
    D: AnalysisStore + 'static,
{
    pub fn new(
        extractor: E,
        enricher: L,
        orchestrator: LlmOrchestrator<P, S>,
        cache: AnalysisCache<D>,
        jobs: JobTracker,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            enricher,
            orchestrator,
            cache,
            jobs,
            reporter: Arc::new(TracingPipelineReporter),
            config,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PipelineReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cache(&self) -> &AnalysisCache<D> {
        &self.cache
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn orchestrator(&self) -> &LlmOrchestrator<P, S> {
        &self.orchestrator
    }

    /// Submit a thread for analysis.
    ///
    /// Returns a completed descriptor with the `"cache"` job id on a cache
    /// hit, otherwise a queued job whose pipeline has been started.
    pub async fn submit(&self, request: AnalyzeRequest) -> Result<JobRecord, AppError> {
        let url = validate_thread_url(&request.url)?;

        if !request.force_refresh {
            if let Some(result) = self.cache.get(&url).await {
                self.reporter.report(PipelineEvent::CacheHit { url: &url });
                return Ok(JobRecord::cached(result));
            }
        }

        let job = JobRecord::queued(Uuid::new_v4().to_string());
        self.jobs.create(job.clone());
        self.reporter.report(PipelineEvent::JobQueued {
            job_id: &job.job_id,
            url: &url,
        });

        let service = self.clone();
        let job_id = job.job_id.clone();
        let options = request.extract_options();
        tokio::spawn(async move {
            service.run(&job_id, &url, options).await;
        });

        Ok(job)
    }

    pub fn status(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.get(job_id)
    }

    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<JobRecord> {
        self.jobs.list(status, limit)
    }

    /// Run the pipeline for an existing job and record the outcome.
    ///
    /// Errors and panics inside the pipeline end the job as failed; nothing
    /// escapes to the caller.
    pub async fn run(&self, job_id: &str, url: &str, options: ExtractOptions) {
        let worker = self.clone();
        let (id, target) = (job_id.to_string(), url.to_string());
        let outcome = tokio::spawn(async move { worker.process(&id, &target, options).await }).await;

        match outcome {
            Ok(Ok(result)) => {
                self.jobs.modify(job_id, |job| job.complete(result));
                self.reporter.report(PipelineEvent::JobCompleted { job_id });
            }
            Ok(Err(e)) => self.fail(job_id, &e.job_message()),
            Err(join_error) => {
                let detail = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                let message = format!(
                    "Unexpected error: {}",
                    truncate_chars(&detail, UNEXPECTED_DETAIL_LEN)
                );
                tracing::error!(%job_id, error = %detail, "Pipeline task aborted");
                self.fail(job_id, &message);
            }
        }
    }

    async fn process(
        &self,
        job_id: &str,
        url: &str,
        options: ExtractOptions,
    ) -> Result<AnalysisResult, AppError> {
        self.advance(job_id, Stage::Started);

        // 1. Extract
        tracing::info!(%job_id, %url, lite_mode = options.lite_mode, "Extracting thread");
        let ctx = tokio::time::timeout(
            self.config.extract_timeout,
            self.extractor.extract(url, options),
        )
        .await
        .map_err(|_| AppError::Timeout(self.config.extract_timeout.as_secs()))??;
        self.advance(job_id, Stage::Extracted);

        // 2. Analyze
        let analysis = self.orchestrator.analyze(&ctx).await?;
        tracing::info!(%job_id, provider = %analysis.provider, "LLM analysis complete");
        self.advance(job_id, Stage::Analyzed);

        // 3. Enrich
        let candidates = link_candidates(&analysis.data);
        let links = self.enrich_or_degrade(job_id, &candidates).await;
        self.advance(job_id, Stage::Enriched);

        // 4. Assemble
        let result = AnalysisResult::assemble(&ctx, &analysis.data, links);
        self.advance(job_id, Stage::Assembled);

        // 5. Cache
        self.cache.save(url, &result).await;

        Ok(result)
    }

    async fn enrich_or_degrade(&self, job_id: &str, candidates: &[LinkCandidate]) -> Vec<EnrichedLink> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if candidates.len() > MAX_ENRICH_LINKS {
            tracing::debug!(
                %job_id,
                suggested = candidates.len(),
                kept = MAX_ENRICH_LINKS,
                "Dropping surplus links before enrichment"
            );
        }
        let candidates = &candidates[..candidates.len().min(MAX_ENRICH_LINKS)];

        let outcome =
            tokio::time::timeout(self.config.enrich_timeout, self.enricher.enrich(candidates))
                .await;
        match outcome {
            Ok(Ok(links)) => links,
            Ok(Err(e)) => {
                tracing::warn!(%job_id, error = %e, "Link enrichment failed, using basic links");
                candidates.iter().map(EnrichedLink::basic).collect()
            }
            Err(_) => {
                tracing::warn!(%job_id, "Link enrichment timed out, using basic links");
                candidates.iter().map(EnrichedLink::basic).collect()
            }
        }
    }

    fn advance(&self, job_id: &str, stage: Stage) {
        if self.jobs.modify(job_id, |job| job.advance(stage)).is_none() {
            tracing::debug!(%job_id, %stage, "Job no longer tracked");
        }
        self.reporter
            .report(PipelineEvent::StageReached { job_id, stage });
    }

    fn fail(&self, job_id: &str, error: &str) {
        let stored = self.jobs.modify(job_id, |job| job.fail(error));
        let recorded = stored
            .as_ref()
            .and_then(|j| j.error.as_deref())
            .unwrap_or(error);
        self.reporter.report(PipelineEvent::JobFailed {
            job_id,
            error: recorded,
        });
    }

    /// Enrich an ad-hoc list of links.
    pub async fn enrich_links(
        &self,
        links: &[LinkCandidate],
    ) -> Result<Vec<EnrichedLink>, AppError> {
        if links.len() > MAX_ENRICH_LINKS {
            return Err(AppError::InvalidInput(format!(
                "at most {} links per request, got {}",
                MAX_ENRICH_LINKS,
                links.len()
            )));
        }
        if links.is_empty() {
            return Ok(Vec::new());
        }
        self.enricher.enrich(links).await
    }

    /// Drop a thread's cached analysis from both tiers.
    pub async fn invalidate(&self, url: &str) -> bool {
        self.cache.invalidate(url).await
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            jobs: self.jobs.stats(),
            cache: self.cache.stats().await,
            rate_limits: self.orchestrator.rate_limiter().stats().await,
        }
    }

    pub async fn health(&self) -> HealthReport {
        let durable_cache = match self.cache.durable().ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Durable cache unreachable");
                false
            }
        };
        HealthReport {
            healthy: durable_cache,
            providers: self.orchestrator.configured_providers(),
            durable_cache,
            jobs_active: self.jobs.stats().active(),
            cache: self.cache.stats().await,
            rate_limits: self.orchestrator.rate_limiter().stats().await,
        }
    }

    /// Sweep expired jobs and release the durable cache tier.
    pub async fn shutdown(&self) {
        self.jobs.sweep();
        self.reporter.report(PipelineEvent::ShuttingDown {
            jobs_remaining: self.jobs.stats().total,
        });
        self.cache.close().await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
