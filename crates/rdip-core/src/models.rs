use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// LLM backends the orchestrator can route a thread to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Groq,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Groq, Provider::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Flags controlling how much of a thread is extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Pull a larger slice of the comment tree.
    pub deep_scan: bool,
    /// Truncate post and comments aggressively to keep prompts small.
    pub lite_mode: bool,
}

/// Thread-level facts gathered during extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub subreddit: String,
    pub created_utc: Option<f64>,
    pub total_comments: u64,
    pub upvote_ratio: Option<f64>,
    pub urls_detected: Vec<String>,
    pub is_self: bool,
    pub link_flair_text: Option<String>,
    pub lite_mode: bool,
    /// Set when the post or comments were cut down to fit a budget.
    pub truncated: bool,
}

/// Normalized thread content handed from the extractor to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub id: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    /// Flattened comment tree, one `>`-indented line per comment.
    pub comments: String,
    pub token_count_groq: usize,
    pub token_count_gemini: usize,
    pub metadata: ThreadMetadata,
}

impl ThreadContext {
    /// Token estimate for the given provider's tokenizer.
    pub fn token_count(&self, provider: Provider) -> usize {
        match provider {
            Provider::Groq => self.token_count_groq,
            Provider::Gemini => self.token_count_gemini,
        }
    }
}

/// A single provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Empty when the provider takes one combined prompt.
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Mixed,
    Controversial,
}

impl SentimentLabel {
    /// Lenient parse of a model-produced label; unknown labels map to `Neutral`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" | "positivo" => SentimentLabel::Positive,
            "negative" | "negativo" => SentimentLabel::Negative,
            "mixed" | "mixto" => SentimentLabel::Mixed,
            "controversial" => SentimentLabel::Controversial,
            _ => SentimentLabel::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// Always within `[0, 1]`.
    pub score: f64,
    pub details: String,
}

impl Sentiment {
    pub fn neutral(details: impl Into<String>) -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.5,
            details: details.into(),
        }
    }

    /// Build from a loosely-typed model object, defaulting missing parts.
    pub fn from_value(value: Option<&serde_json::Value>) -> Self {
        let Some(obj) = value.and_then(|v| v.as_object()) else {
            return Self::neutral("");
        };

        let label = obj
            .get("label")
            .and_then(|v| v.as_str())
            .map(SentimentLabel::parse_lenient)
            .unwrap_or(SentimentLabel::Neutral);

        let score = obj
            .get("score")
            .and_then(|v| match v {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .filter(|s: &f64| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0))
            .unwrap_or(0.5);

        let details = obj
            .get("details")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Self {
            label,
            score,
            details,
        }
    }
}

/// A link the model flagged as useful, before enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub url: String,
    #[serde(rename = "type", default)]
    pub link_type: String,
    #[serde(default)]
    pub context: String,
}

/// A link with fetched metadata and a relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLink {
    pub url: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub link_type: String,
    pub context: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon: Option<String>,
    /// Within `[0, 1]`.
    pub relevance: f64,
}

impl EnrichedLink {
    /// A record carrying only what the candidate itself provides.
    pub fn basic(candidate: &LinkCandidate) -> Self {
        let domain = url::Url::parse(&candidate.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .unwrap_or_default();
        Self {
            url: candidate.url.clone(),
            domain,
            link_type: candidate.link_type.clone(),
            context: candidate.context.clone(),
            title: None,
            description: None,
            favicon: None,
            relevance: 0.3,
        }
    }
}

/// Thread facts echoed back alongside the analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMeta {
    pub title: String,
    pub author: String,
    pub upvotes: i64,
    pub total_comments: u64,
    pub subreddit: String,
    pub created_utc: Option<f64>,
    pub upvote_ratio: Option<f64>,
    pub url: String,
    pub is_self: bool,
    pub link_flair_text: Option<String>,
}

impl From<&ThreadContext> for ThreadMeta {
    fn from(ctx: &ThreadContext) -> Self {
        Self {
            title: ctx.title.clone(),
            author: ctx.author.clone(),
            upvotes: ctx.score,
            total_comments: ctx.metadata.total_comments,
            subreddit: ctx.metadata.subreddit.clone(),
            created_utc: ctx.metadata.created_utc,
            upvote_ratio: ctx.metadata.upvote_ratio,
            url: ctx.url.clone(),
            is_self: ctx.metadata.is_self,
            link_flair_text: ctx.metadata.link_flair_text.clone(),
        }
    }
}

/// The composite analysis returned to callers and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub meta: ThreadMeta,
    pub raw_post_text: String,
    pub raw_comments_text: String,
    pub summary_post: String,
    pub summary_comments: String,
    pub sentiment_post: Sentiment,
    pub sentiment_comments: Sentiment,
    pub consensus: String,
    pub key_controversies: Vec<String>,
    pub useful_links: Vec<EnrichedLink>,
}

impl AnalysisResult {
    /// Combine the thread, the model's structured output and the enriched links.
    ///
    /// Missing or mistyped fields in `analysis` fall back to empty values and
    /// neutral sentiments.
    pub fn assemble(
        ctx: &ThreadContext,
        analysis: &serde_json::Value,
        useful_links: Vec<EnrichedLink>,
    ) -> Self {
        let text = |key: &str| {
            analysis
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let key_controversies = analysis
            .get("key_controversies")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            meta: ThreadMeta::from(ctx),
            raw_post_text: ctx.body.clone(),
            raw_comments_text: ctx.comments.clone(),
            summary_post: text("summary_post"),
            summary_comments: text("summary_comments"),
            sentiment_post: Sentiment::from_value(analysis.get("sentiment_post")),
            sentiment_comments: Sentiment::from_value(analysis.get("sentiment_comments")),
            consensus: text("consensus"),
            key_controversies,
            useful_links,
        }
    }
}

/// A row of the durable cache tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub url_hash: String,
    pub url: String,
    pub analysis: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: i64,
}

/// Aggregate figures for the durable cache tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: i64,
    pub total_accesses: i64,
}

/// Pull the candidate link list out of the model's structured output.
///
/// Entries without a usable `url` are dropped.
pub fn link_candidates(analysis: &serde_json::Value) -> Vec<LinkCandidate> {
    analysis
        .get("useful_links")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<LinkCandidate>(item.clone()).ok())
                .filter(|c| !c.url.trim().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical form of a thread URL used for cache lookups.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Cache key for a thread URL: the first 16 hex chars of the SHA-256 of its
/// normalized form.
pub fn cache_key(url: &str) -> String {
    let mut hash = compute_hash(&normalize_url(url));
    hash.truncate(16);
    hash
}
