pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod job_store;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod recovery;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use cache::{AnalysisCache, CacheConfig, CacheStats};
pub use config::Settings;
pub use error::AppError;
pub use job::{AnalyzeRequest, JobRecord, JobStatus, PipelineConfig, Stage};
pub use job_store::{JobStats, JobTracker};
pub use models::{AnalysisResult, Provider, ThreadContext, cache_key, compute_hash};
pub use orchestrator::{LlmOrchestrator, OrchestratorConfig};
pub use pipeline::{AnalysisService, PipelineReporter, TracingPipelineReporter};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use traits::{AnalysisStore, LinkEnricher, LlmProvider, NullStore, ThreadExtractor};
