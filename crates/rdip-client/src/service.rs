//! Wiring of the analysis service with the HTTP-backed collaborators.

use rdip_core::{
    AnalysisCache, AnalysisService, AnalysisStore, AppError, JobTracker, LlmOrchestrator,
    RateLimiter, Settings,
};

use crate::{GeminiProvider, GroqProvider, HttpLinkEnricher, RedditExtractor};

/// The analysis service over Reddit, Groq and Gemini, with `D` as durable tier.
pub type HttpAnalysisService<D> =
    AnalysisService<RedditExtractor, HttpLinkEnricher, GroqProvider, GeminiProvider, D>;

/// Build the service from settings, extracting with the configured user agent.
pub fn build_service<D: AnalysisStore + 'static>(
    settings: &Settings,
    store: D,
) -> Result<HttpAnalysisService<D>, AppError> {
    let extractor = RedditExtractor::with_timeout(&settings.user_agent, settings.extract_timeout)?;
    build_service_with_extractor(settings, extractor, store)
}

/// Like [`build_service`] with a caller-supplied extractor.
///
/// A provider is configured only when its API key is set.
pub fn build_service_with_extractor<D: AnalysisStore + 'static>(
    settings: &Settings,
    extractor: RedditExtractor,
    store: D,
) -> Result<HttpAnalysisService<D>, AppError> {
    let groq = settings
        .groq_api_key
        .as_deref()
        .map(|key| GroqProvider::new(key, &settings.groq_model)?.with_timeout(settings.llm_timeout))
        .transpose()?;
    let gemini = settings
        .google_api_key
        .as_deref()
        .map(|key| GeminiProvider::new(key, &settings.gemini_model)?.with_timeout(settings.llm_timeout))
        .transpose()?;

    if groq.is_none() && gemini.is_none() {
        tracing::warn!("No LLM provider configured; set GROQ_API_KEY or GOOGLE_API_KEY");
    }

    let orchestrator = LlmOrchestrator::new(
        groq,
        gemini,
        RateLimiter::new(settings.rate_limit_config()),
        settings.orchestrator_config(),
    );

    Ok(AnalysisService::new(
        extractor,
        HttpLinkEnricher::new()?,
        orchestrator,
        AnalysisCache::new(store, settings.cache_config()),
        JobTracker::new(settings.job_ttl),
        settings.pipeline_config(),
    ))
}

#[cfg(test)]
mod tests {
    use rdip_core::{NullStore, Provider};

    use super::*;

    #[tokio::test]
    async fn providers_follow_configured_keys() {
        let service = build_service(&Settings::default(), NullStore).unwrap();
        assert!(service.orchestrator().configured_providers().is_empty());

        let settings = Settings {
            groq_api_key: Some("gsk-test".into()),
            ..Settings::default()
        };
        let service = build_service(&settings, NullStore).unwrap();
        assert_eq!(service.orchestrator().configured_providers(), vec![Provider::Groq]);

        let settings = Settings {
            groq_api_key: Some("gsk-test".into()),
            google_api_key: Some("g-test".into()),
            ..Settings::default()
        };
        let service = build_service(&settings, NullStore).unwrap();
        assert_eq!(
            service.orchestrator().configured_providers(),
            vec![Provider::Groq, Provider::Gemini]
        );
    }

    #[tokio::test]
    async fn jobs_start_empty() {
        let extractor = RedditExtractor::new("rdip-test/0.1")
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let service =
            build_service_with_extractor(&Settings::default(), extractor, NullStore).unwrap();
        assert_eq!(service.jobs().stats().total, 0);
    }
}
