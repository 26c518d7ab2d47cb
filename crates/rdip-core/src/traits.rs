use std::future::Future;

use crate::error::AppError;
use crate::models::{
    EnrichedLink, ExtractOptions, LinkCandidate, LlmRequest, Provider, StoreStats,
    StoredAnalysis, ThreadContext,
};

/// Fetches a discussion thread and normalizes it into a [`ThreadContext`].
///
/// Implementations report a malformed reference as [`AppError::InvalidUrl`]
/// and a missing thread as [`AppError::NotFound`].
pub trait ThreadExtractor: Send + Sync + Clone {
    fn extract(
        &self,
        url: &str,
        options: ExtractOptions,
    ) -> impl Future<Output = Result<ThreadContext, AppError>> + Send;
}

/// Adds fetched metadata and a relevance score to candidate links.
///
/// Per-link failures degrade to a basic record rather than failing the batch.
pub trait LinkEnricher: Send + Sync + Clone {
    fn enrich(
        &self,
        links: &[LinkCandidate],
    ) -> impl Future<Output = Result<Vec<EnrichedLink>, AppError>> + Send;
}

/// How a provider expects the prompt to be shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Separate system and user messages.
    SystemAndUser,
    /// System and user prompt joined into one text.
    Combined,
}

/// A remote LLM that turns a prompt into raw text.
pub trait LlmProvider: Send + Sync + Clone {
    /// Which rate-limit window this provider draws from.
    fn provider(&self) -> Provider;

    fn prompt_style(&self) -> PromptStyle {
        PromptStyle::SystemAndUser
    }

    fn invoke(
        &self,
        request: &LlmRequest,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Durable tier of the analysis cache, keyed by URL hash.
pub trait AnalysisStore: Send + Sync + Clone {
    fn load(
        &self,
        url_hash: &str,
    ) -> impl Future<Output = Result<Option<StoredAnalysis>, AppError>> + Send;

    /// Insert a new entry with an access count of one, or overwrite the
    /// payload of an existing entry and increment its count.
    fn upsert(
        &self,
        url_hash: &str,
        url: &str,
        analysis: &serde_json::Value,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Increment the access counter and bump `updated_at`.
    fn record_access(&self, url_hash: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Returns true if an entry was deleted.
    fn delete(&self, url_hash: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn stats(&self) -> impl Future<Output = Result<StoreStats, AppError>> + Send;

    /// Cheap liveness check used by the health endpoint.
    fn ping(&self) -> impl Future<Output = Result<(), AppError>> + Send {
        async { Ok(()) }
    }

    /// Release underlying connections.
    fn close(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// An AnalysisStore that keeps nothing, for running with the volatile tier only.
#[derive(Debug, Clone)]
pub struct NullStore;

impl AnalysisStore for NullStore {
    async fn load(&self, _url_hash: &str) -> Result<Option<StoredAnalysis>, AppError> {
        Ok(None)
    }

    async fn upsert(
        &self,
        _url_hash: &str,
        _url: &str,
        _analysis: &serde_json::Value,
    ) -> Result<(), AppError> {
        Ok(())
    }

    async fn record_access(&self, _url_hash: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn delete(&self, _url_hash: &str) -> Result<bool, AppError> {
        Ok(false)
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        Ok(StoreStats::default())
    }
}
