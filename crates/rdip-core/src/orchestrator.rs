//! Provider selection and invocation for thread analysis.
//!
//! The primary provider is tried first when it is configured, the thread fits
//! under its token ceiling, and its rate window admits the call. On any
//! failure or refusal the secondary provider gets one attempt under the same
//! admission rule. Raw output goes through the recovery cascade, so a
//! reachable provider always yields a structured value.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::models::{LlmRequest, Provider, ThreadContext};
use crate::prompt;
use crate::rate_limit::RateLimiter;
use crate::recovery::{self, Strategy};
use crate::traits::{LlmProvider, PromptStyle};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Threads with at least this many primary-tokenizer tokens skip the primary.
    pub primary_token_ceiling: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on a single provider call.
    pub call_timeout: Duration,
    /// Provider calls allowed in flight at once, across all jobs.
    pub max_concurrent_calls: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            primary_token_ceiling: 120_000,
            max_tokens: 2200,
            temperature: 0.4,
            call_timeout: Duration::from_secs(120),
            max_concurrent_calls: 8,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_primary_token_ceiling(mut self, ceiling: usize) -> Self {
        self.primary_token_ceiling = ceiling;
        self
    }
}

/// Structured model output plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmAnalysis {
    pub data: serde_json::Value,
    pub provider: Provider,
    pub strategy: Strategy,
}

/// Routes analysis requests across a primary and a secondary provider.
#[derive(Clone)]
pub struct LlmOrchestrator<P: LlmProvider, S: LlmProvider> {
    primary: Option<P>,
    secondary: Option<S>,
    rate_limiter: RateLimiter,
    config: OrchestratorConfig,
    permits: Arc<Semaphore>,
}

impl<P: LlmProvider, S: LlmProvider> LlmOrchestrator<P, S> {
    pub fn new(
        primary: Option<P>,
        secondary: Option<S>,
        rate_limiter: RateLimiter,
        config: OrchestratorConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));
        Self {
            primary,
            secondary,
            rate_limiter,
            config,
            permits,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Providers that have credentials configured, primary first.
    pub fn configured_providers(&self) -> Vec<Provider> {
        self.primary
            .iter()
            .map(|p| p.provider())
            .chain(self.secondary.iter().map(|s| s.provider()))
            .collect()
    }

    /// Analyze a thread with the first provider that can be reached.
    ///
    /// Fails with [`AppError::NoProviderAvailable`] when nothing was attempted
    /// and [`AppError::AllProvidersFailed`] when every attempt failed.
    pub async fn analyze(&self, ctx: &ThreadContext) -> Result<LlmAnalysis, AppError> {
        let system = prompt::system_prompt(&ctx.metadata.subreddit);
        let user = prompt::user_prompt(ctx);
        let mut last_error: Option<AppError> = None;

        if let Some(primary) = &self.primary {
            let provider = primary.provider();
            let tokens = ctx.token_count(provider);
            if tokens >= self.config.primary_token_ceiling {
                tracing::info!(
                    %provider,
                    tokens,
                    ceiling = self.config.primary_token_ceiling,
                    "Thread too large for primary provider"
                );
            } else if self.rate_limiter.try_acquire(provider).await {
                match self.attempt(primary, &system, &user).await {
                    Ok(analysis) => return Ok(analysis),
                    Err(e) => {
                        tracing::warn!(%provider, error = %e, "Primary provider failed");
                        last_error = Some(e);
                    }
                }
            }
        }

        if let Some(secondary) = &self.secondary {
            let provider = secondary.provider();
            if self.rate_limiter.try_acquire(provider).await {
                match self.attempt(secondary, &system, &user).await {
                    Ok(analysis) => return Ok(analysis),
                    Err(e) => {
                        tracing::error!(%provider, error = %e, "Secondary provider failed");
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(AppError::AllProvidersFailed {
                last_error: e.to_string(),
            }),
            None => Err(AppError::NoProviderAvailable),
        }
    }

    async fn attempt<L: LlmProvider>(
        &self,
        llm: &L,
        system: &str,
        user: &str,
    ) -> Result<LlmAnalysis, AppError> {
        let provider = llm.provider();
        let request = match llm.prompt_style() {
            PromptStyle::SystemAndUser => LlmRequest {
                system_prompt: system.to_string(),
                user_prompt: user.to_string(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
            PromptStyle::Combined => LlmRequest {
                system_prompt: String::new(),
                user_prompt: format!("{system}\n\n{user}"),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::Generic("LLM call pool closed".into()))?;

        tracing::info!(%provider, "Calling LLM");
        let raw = tokio::time::timeout(self.config.call_timeout, llm.invoke(&request))
            .await
            .map_err(|_| AppError::Timeout(self.config.call_timeout.as_secs()))??;

        let recovered = recovery::recover(&raw);
        tracing::info!(%provider, strategy = %recovered.strategy, chars = raw.len(), "LLM response received");

        Ok(LlmAnalysis {
            data: recovered.value,
            provider,
            strategy: recovered.strategy,
        })
    }
}
