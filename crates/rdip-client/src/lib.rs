pub mod enricher;
pub mod fetcher;
pub mod gemini;
pub mod llm;
pub mod reddit;
pub mod service;

pub use enricher::HttpLinkEnricher;
pub use fetcher::HtmlFetcher;
pub use gemini::GeminiProvider;
pub use llm::GroqProvider;
pub use reddit::RedditExtractor;
pub use service::{HttpAnalysisService, build_service, build_service_with_extractor};
