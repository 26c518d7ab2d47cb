//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::error::AppError;
use crate::models::{
    AnalysisResult, EnrichedLink, ExtractOptions, LinkCandidate, LlmRequest, Provider,
    StoreStats, StoredAnalysis, ThreadContext, ThreadMetadata,
};
use crate::pipeline::{PipelineEvent, PipelineReporter};
use crate::traits::{AnalysisStore, LinkEnricher, LlmProvider, PromptStyle, ThreadExtractor};

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor that returns a fixed thread, a queued error, or panics.
#[derive(Clone)]
pub struct MockExtractor {
    context: ThreadContext,
    errors: Arc<Mutex<Vec<AppError>>>,
    panic_message: Option<&'static str>,
    pub calls: Arc<Mutex<Vec<(String, ExtractOptions)>>>,
}

impl MockExtractor {
    pub fn new(context: ThreadContext) -> Self {
        Self {
            context,
            errors: Arc::new(Mutex::new(Vec::new())),
            panic_message: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails the first call with `error`, then returns the default thread.
    pub fn with_error(error: AppError) -> Self {
        let mock = Self::new(make_test_context());
        mock.errors.lock().unwrap().push(error);
        mock
    }

    /// Panics on every call.
    pub fn panicking(message: &'static str) -> Self {
        Self {
            panic_message: Some(message),
            ..Self::new(make_test_context())
        }
    }
}

impl ThreadExtractor for MockExtractor {
    async fn extract(&self, url: &str, options: ExtractOptions) -> Result<ThreadContext, AppError> {
        self.calls.lock().unwrap().push((url.to_string(), options));
        if let Some(message) = self.panic_message {
            panic!("{message}");
        }
        let mut errors = self.errors.lock().unwrap();
        if errors.is_empty() {
            Ok(self.context.clone())
        } else {
            Err(errors.remove(0))
        }
    }
}

// ---------------------------------------------------------------------------
// MockEnricher
// ---------------------------------------------------------------------------

/// Mock enricher that marks every link as fetched, or fails once.
#[derive(Clone)]
pub struct MockEnricher {
    error: Arc<Mutex<Option<AppError>>>,
    delay: Option<Duration>,
    pub calls: Arc<Mutex<Vec<Vec<LinkCandidate>>>>,
}

impl MockEnricher {
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
            ..Self::passthrough()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl LinkEnricher for MockEnricher {
    async fn enrich(&self, links: &[LinkCandidate]) -> Result<Vec<EnrichedLink>, AppError> {
        self.calls.lock().unwrap().push(links.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(links
            .iter()
            .map(|c| EnrichedLink {
                title: Some(format!("Title of {}", c.url)),
                relevance: 0.7,
                ..EnrichedLink::basic(c)
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockLlm
// ---------------------------------------------------------------------------

/// Mock LLM provider with a response queue and a default response.
#[derive(Clone)]
pub struct MockLlm {
    provider: Provider,
    style: PromptStyle,
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns `default_response`.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    default_response: String,
    delay: Option<Duration>,
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl MockLlm {
    pub fn new(provider: Provider, text: &str) -> Self {
        Self {
            provider,
            style: PromptStyle::SystemAndUser,
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: text.to_string(),
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(provider: Provider, error: AppError) -> Self {
        let mock = Self::new(provider, "{}");
        mock.responses.lock().unwrap().push(Err(error));
        mock
    }

    pub fn with_responses(provider: Provider, responses: Vec<Result<String, AppError>>) -> Self {
        let mock = Self::new(provider, "{}");
        *mock.responses.lock().unwrap() = responses;
        mock
    }

    /// Expect a single combined prompt.
    pub fn combined(mut self) -> Self {
        self.style = PromptStyle::Combined;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl LlmProvider for MockLlm {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn prompt_style(&self) -> PromptStyle {
        self.style
    }

    async fn invoke(&self, request: &LlmRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(self.default_response.clone())
            } else {
                responses.remove(0)
            }
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }
}

// ---------------------------------------------------------------------------
// MockAnalysisStore
// ---------------------------------------------------------------------------

/// In-memory durable tier with switchable failure.
#[derive(Clone, Default)]
pub struct MockAnalysisStore {
    entries: Arc<Mutex<HashMap<String, StoredAnalysis>>>,
    failure: Arc<Mutex<Option<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a database error.
    pub fn fail_with(&self, error: AppError) {
        *self.failure.lock().unwrap() = Some(error.to_string());
    }

    fn check(&self) -> Result<(), AppError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(msg) => Err(AppError::DatabaseError(msg.clone())),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn access_count(&self, url_hash: &str) -> Option<i64> {
        self.entries
            .lock()
            .unwrap()
            .get(url_hash)
            .map(|e| e.access_count)
    }

    /// Insert a row bypassing serialization, e.g. a corrupt payload.
    pub fn insert_raw(&self, url_hash: &str, url: &str, analysis: serde_json::Value) {
        let now = Utc::now();
        self.entries.lock().unwrap().insert(
            url_hash.to_string(),
            StoredAnalysis {
                url_hash: url_hash.to_string(),
                url: url.to_string(),
                analysis,
                created_at: now,
                updated_at: now,
                access_count: 1,
            },
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AnalysisStore for MockAnalysisStore {
    async fn load(&self, url_hash: &str) -> Result<Option<StoredAnalysis>, AppError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().get(url_hash).cloned())
    }

    async fn upsert(
        &self,
        url_hash: &str,
        url: &str,
        analysis: &serde_json::Value,
    ) -> Result<(), AppError> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(url_hash) {
            Some(entry) => {
                entry.analysis = analysis.clone();
                entry.updated_at = Utc::now();
                entry.access_count += 1;
            }
            None => {
                let now = Utc::now();
                entries.insert(
                    url_hash.to_string(),
                    StoredAnalysis {
                        url_hash: url_hash.to_string(),
                        url: url.to_string(),
                        analysis: analysis.clone(),
                        created_at: now,
                        updated_at: now,
                        access_count: 1,
                    },
                );
            }
        }
        Ok(())
    }

    async fn record_access(&self, url_hash: &str) -> Result<(), AppError> {
        self.check()?;
        if let Some(entry) = self.entries.lock().unwrap().get_mut(url_hash) {
            entry.access_count += 1;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, url_hash: &str) -> Result<bool, AppError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().remove(url_hash).is_some())
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        self.check()?;
        let entries = self.entries.lock().unwrap();
        Ok(StoreStats {
            entries: entries.len() as i64,
            total_accesses: entries.values().map(|e| e.access_count).sum(),
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock pipeline reporter that records event labels.
#[derive(Clone, Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineReporter for MockReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        let label = match &event {
            PipelineEvent::CacheHit { .. } => "CacheHit".to_string(),
            PipelineEvent::JobQueued { .. } => "JobQueued".to_string(),
            PipelineEvent::StageReached { stage, .. } => format!("StageReached:{stage}"),
            PipelineEvent::JobCompleted { .. } => "JobCompleted".to_string(),
            PipelineEvent::JobFailed { .. } => "JobFailed".to_string(),
            PipelineEvent::ShuttingDown { .. } => "ShuttingDown".to_string(),
        };
        self.events.lock().unwrap().push(label);
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a small thread for testing.
pub fn make_test_context() -> ThreadContext {
    ThreadContext {
        id: "abc123".to_string(),
        url: "https://www.reddit.com/r/rust/comments/abc123/hello".to_string(),
        title: "Hello".to_string(),
        body: "Is the borrow checker worth it?".to_string(),
        author: "ferris".to_string(),
        score: 128,
        comments: "[score=10] alice: Absolutely, see https://github.com/rust-lang/rust\n> [score=3] bob: Agreed"
            .to_string(),
        token_count_groq: 40,
        token_count_gemini: 44,
        metadata: ThreadMetadata {
            subreddit: "rust".to_string(),
            created_utc: Some(1_700_000_000.0),
            total_comments: 2,
            upvote_ratio: Some(0.97),
            urls_detected: vec!["https://github.com/rust-lang/rust".to_string()],
            is_self: true,
            link_flair_text: Some("Discussion".to_string()),
            lite_mode: false,
            truncated: false,
        },
    }
}

/// Well-formed model output for [`make_test_context`].
pub fn sample_analysis_json() -> String {
    serde_json::json!({
        "summary_post": "A post about Rust",
        "summary_comments": "Commenters mostly agree the borrow checker pays off",
        "sentiment_post": {"label": "Positive", "score": 0.8, "details": "curious"},
        "sentiment_comments": {"label": "Positive", "score": 0.75, "details": "supportive"},
        "consensus": "Broad agreement",
        "key_controversies": ["learning curve"],
        "useful_links": [
            {"url": "https://github.com/rust-lang/rust", "type": "GitHub", "context": "alice links the compiler"}
        ]
    })
    .to_string()
}

/// Create an analysis result with the given title.
pub fn make_test_result(title: &str) -> AnalysisResult {
    let mut ctx = make_test_context();
    ctx.title = title.to_string();
    let analysis: serde_json::Value =
        serde_json::from_str(&sample_analysis_json()).unwrap_or_default();
    AnalysisResult::assemble(&ctx, &analysis, vec![])
}
