//! Thread extraction through Reddit's public JSON endpoint.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use rdip_core::error::{AppError, truncate_chars};
use rdip_core::models::{ExtractOptions, ThreadContext, ThreadMetadata};
use rdip_core::traits::ThreadExtractor;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::llm::send_error;

const LITE_MAX_POST_CHARS: usize = 2000;
const LITE_MAX_COMMENTS: usize = 30;
const LITE_MAX_COMMENT_CHARS: usize = 500;
const LITE_MAX_TOTAL_TOKENS: usize = 4000;

const NORMAL_COMMENT_LIMIT: u32 = 200;
const DEEP_COMMENT_LIMIT: u32 = 500;
const LITE_COMMENT_LIMIT: u32 = 100;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'\]\)]+"#).expect("valid URL pattern"));

/// Extracts threads from `reddit.com` without API credentials.
#[derive(Clone)]
pub struct RedditExtractor {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl RedditExtractor {
    pub fn new(user_agent: &str) -> Result<Self, AppError> {
        Self::with_timeout(user_agent, Duration::from_secs(30))
    }

    pub fn with_timeout(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://www.reddit.com".to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Send listing requests to another host, e.g. a local stub.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Resolve a thread URL to its `.json` listing endpoint.
    ///
    /// Short links are rewritten directly; share links are followed to
    /// their canonical thread first.
    async fn json_endpoint(&self, url: &str, options: ExtractOptions) -> Result<Url, AppError> {
        let parsed = Url::parse(url).map_err(|_| AppError::InvalidUrl(url.to_string()))?;
        let host = parsed.host_str().unwrap_or_default();

        let path = if host == "redd.it" {
            let id = parsed.path().trim_matches('/');
            if id.is_empty() {
                return Err(AppError::InvalidUrl(url.to_string()));
            }
            format!("/comments/{id}")
        } else if parsed.path().contains("/s/") {
            let response = self
                .client
                .get(parsed.clone())
                .send()
                .await
                .map_err(|e| send_error(self.timeout_secs, e))?;
            let resolved = response.url().path().to_string();
            if !resolved.contains("/comments/") {
                return Err(AppError::InvalidUrl(url.to_string()));
            }
            resolved
        } else {
            parsed.path().to_string()
        };

        let canonical = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|_| AppError::InvalidUrl(url.to_string()))?;
        Ok(listing_url(&canonical, options))
    }
}

/// `<thread>.json` with the comment query for the requested depth.
fn listing_url(thread: &Url, options: ExtractOptions) -> Url {
    let mut endpoint = thread.clone();
    endpoint.set_query(None);
    endpoint.set_fragment(None);
    let path = format!("{}.json", thread.path().trim_end_matches('/'));
    endpoint.set_path(&path);

    let limit = if options.lite_mode {
        LITE_COMMENT_LIMIT
    } else if options.deep_scan {
        DEEP_COMMENT_LIMIT
    } else {
        NORMAL_COMMENT_LIMIT
    };
    endpoint
        .query_pairs_mut()
        .append_pair("sort", "top")
        .append_pair("limit", &limit.to_string())
        .append_pair("raw_json", "1");
    endpoint
}

impl ThreadExtractor for RedditExtractor {
    async fn extract(&self, url: &str, options: ExtractOptions) -> Result<ThreadContext, AppError> {
        tracing::info!(
            %url,
            deep_scan = options.deep_scan,
            lite_mode = options.lite_mode,
            "Extracting thread"
        );
        let endpoint = self.json_endpoint(url, options).await?;

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| send_error(self.timeout_secs, e))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::GONE => {
                return Err(AppError::NotFound);
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(AppError::RateLimitExceeded),
            status if !status.is_success() => {
                return Err(AppError::ExtractionError(format!(
                    "HTTP {} from thread endpoint",
                    status.as_u16()
                )));
            }
            _ => {}
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| AppError::InvalidUrl(url.to_string()))?;

        let ctx = parse_thread(url, &body, options)?;
        tracing::info!(
            thread_id = %ctx.id,
            comments = ctx.metadata.total_comments,
            tokens = ctx.token_count_groq,
            lite_mode = options.lite_mode,
            "Extraction complete"
        );
        Ok(ctx)
    }
}

// ---- Listing types ----

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    created_utc: Option<f64>,
    upvote_ratio: Option<f64>,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    is_self: bool,
    link_flair_text: Option<String>,
}

#[derive(Deserialize)]
struct RawComment {
    author: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    depth: usize,
    #[serde(default)]
    replies: Value,
}

/// A comment in depth-first order.
struct FlatComment {
    author: String,
    body: String,
    score: i64,
    depth: usize,
}

/// Turn a `[post listing, comment listing]` pair into a [`ThreadContext`].
fn parse_thread(url: &str, body: &Value, options: ExtractOptions) -> Result<ThreadContext, AppError> {
    let listings: Vec<Listing> = serde_json::from_value(body.clone())
        .map_err(|_| AppError::InvalidUrl(url.to_string()))?;
    let mut listings = listings.into_iter();

    let post = listings
        .next()
        .and_then(|l| l.data.children.into_iter().find(|t| t.kind == "t3"))
        .ok_or(AppError::NotFound)?;
    let post: RawPost = serde_json::from_value(post.data)
        .map_err(|e| AppError::ExtractionError(format!("Malformed post: {e}")))?;

    let mut comments = Vec::new();
    if let Some(listing) = listings.next() {
        flatten(listing.data.children, &mut comments);
    }

    let mut truncated = false;
    if options.lite_mode {
        comments.sort_by(|a, b| b.score.cmp(&a.score));
        if comments.len() > LITE_MAX_COMMENTS {
            comments.truncate(LITE_MAX_COMMENTS);
            truncated = true;
        }
    }

    let mut lines: Vec<String> = comments
        .iter()
        .map(|c| serialize_comment(c, options.lite_mode))
        .collect();

    let mut selftext = post.selftext;
    if options.lite_mode && selftext.chars().count() > LITE_MAX_POST_CHARS {
        selftext = format!(
            "{}... [truncated for lite mode]",
            truncate_chars(&selftext, LITE_MAX_POST_CHARS)
        );
        truncated = true;
    }

    let mut serialized = lines.join("\n");
    let mut all_text = format!("{selftext}\n{serialized}");
    let urls_detected = extract_urls(&all_text);
    let (mut groq_tokens, mut gemini_tokens) = estimate_tokens(&all_text);

    if options.lite_mode && groq_tokens > LITE_MAX_TOTAL_TOKENS {
        lines.truncate(lines.len() / 2);
        serialized = lines.join("\n");
        all_text = format!("{selftext}\n{serialized}");
        (groq_tokens, gemini_tokens) = estimate_tokens(&all_text);
        truncated = true;
    }

    Ok(ThreadContext {
        id: post.id,
        url: url.to_string(),
        title: post.title,
        body: selftext,
        author: post.author.unwrap_or_else(|| "[deleted]".to_string()),
        score: post.score,
        comments: serialized,
        token_count_groq: groq_tokens,
        token_count_gemini: gemini_tokens,
        metadata: ThreadMetadata {
            subreddit: post.subreddit,
            created_utc: post.created_utc,
            total_comments: post.num_comments,
            upvote_ratio: post.upvote_ratio,
            urls_detected,
            is_self: post.is_self,
            link_flair_text: post.link_flair_text,
            lite_mode: options.lite_mode,
            truncated,
        },
    })
}

/// Depth-first walk over a comment forest, skipping deleted and removed bodies.
fn flatten(children: Vec<Thing>, out: &mut Vec<FlatComment>) {
    for thing in children {
        if thing.kind != "t1" {
            continue;
        }
        let Ok(comment) = serde_json::from_value::<RawComment>(thing.data) else {
            continue;
        };
        if !matches!(comment.body.as_str(), "" | "[deleted]" | "[removed]") {
            out.push(FlatComment {
                author: comment
                    .author
                    .unwrap_or_else(|| "[deleted]".to_string()),
                body: comment.body,
                score: comment.score,
                depth: comment.depth,
            });
        }
        if comment.replies.is_object() {
            if let Ok(replies) = serde_json::from_value::<Listing>(comment.replies) {
                flatten(replies.data.children, out);
            }
        }
    }
}

fn serialize_comment(comment: &FlatComment, lite_mode: bool) -> String {
    let body = if lite_mode && comment.body.chars().count() > LITE_MAX_COMMENT_CHARS {
        format!("{}...", truncate_chars(&comment.body, LITE_MAX_COMMENT_CHARS))
    } else {
        comment.body.clone()
    };
    let indent = ">".repeat(comment.depth);
    let sep = if comment.depth > 0 { " " } else { "" };
    format!(
        "{indent}{sep}[score={}] {}: {body}",
        comment.score, comment.author
    )
}

/// Unique URLs in first-seen order, trailing punctuation removed.
fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_PATTERN
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '>', ']', '}', '\'', '"'])
                .to_string()
        })
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Character-based token estimates for the Groq and Gemini tokenizers.
fn estimate_tokens(text: &str) -> (usize, usize) {
    let chars = text.chars().count();
    (chars.div_ceil(4), (chars * 2).div_ceil(9))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(author: &str, body: &str, score: i64, depth: usize, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "author": author,
                "body": body,
                "score": score,
                "depth": depth,
                "replies": replies,
            }
        })
    }

    fn thread(selftext: &str, comments: Vec<Value>) -> Value {
        json!([
            {"kind": "Listing", "data": {"children": [{
                "kind": "t3",
                "data": {
                    "id": "abc123",
                    "title": "Is Rust worth it?",
                    "selftext": selftext,
                    "author": "ferris",
                    "score": 42,
                    "num_comments": 3,
                    "created_utc": 1_700_000_000.0,
                    "upvote_ratio": 0.93,
                    "subreddit": "rust",
                    "is_self": true,
                    "link_flair_text": null
                }
            }]}},
            {"kind": "Listing", "data": {"children": comments}}
        ])
    }

    fn sample() -> Value {
        let reply = json!({"kind": "Listing", "data": {"children": [
            comment("bob", "Agreed, see https://doc.rust-lang.org/book/.", 3, 1, json!("")),
            {"kind": "more", "data": {"count": 4, "children": ["x1"]}}
        ]}});
        thread(
            "Asking for https://github.com/rust-lang/rust",
            vec![
                comment("alice", "Absolutely", 10, 0, reply),
                comment("carol", "[deleted]", 1, 0, json!("")),
                comment("dave", "Meh", 2, 0, json!("")),
            ],
        )
    }

    #[test]
    fn flattens_comments_depth_first() {
        let ctx = parse_thread("https://redd.it/abc123", &sample(), ExtractOptions::default())
            .unwrap();

        assert_eq!(ctx.id, "abc123");
        assert_eq!(ctx.title, "Is Rust worth it?");
        assert_eq!(ctx.author, "ferris");
        assert_eq!(ctx.metadata.subreddit, "rust");
        assert_eq!(
            ctx.comments,
            "[score=10] alice: Absolutely\n\
             > [score=3] bob: Agreed, see https://doc.rust-lang.org/book/.\n\
             [score=2] dave: Meh"
        );
        assert!(!ctx.metadata.truncated);
        assert!(ctx.token_count_groq > 0);
    }

    #[test]
    fn detects_unique_urls_without_trailing_punctuation() {
        let ctx = parse_thread("https://redd.it/abc123", &sample(), ExtractOptions::default())
            .unwrap();
        assert_eq!(
            ctx.metadata.urls_detected,
            vec![
                "https://github.com/rust-lang/rust".to_string(),
                "https://doc.rust-lang.org/book/".to_string(),
            ]
        );
        assert_eq!(
            extract_urls("a https://x.io, b https://x.io! c (https://y.io)"),
            vec!["https://x.io".to_string(), "https://y.io".to_string()]
        );
    }

    #[test]
    fn lite_mode_keeps_top_comments_and_truncates() {
        let long_post = "p".repeat(LITE_MAX_POST_CHARS + 50);
        let comments: Vec<Value> = (0..40)
            .map(|i| comment(&format!("u{i}"), &"c".repeat(600), i, 0, json!("")))
            .collect();
        let options = ExtractOptions {
            deep_scan: false,
            lite_mode: true,
        };

        let ctx = parse_thread("https://redd.it/abc123", &thread(&long_post, comments), options)
            .unwrap();

        assert!(ctx.body.ends_with("... [truncated for lite mode]"));
        assert!(ctx.metadata.lite_mode);
        assert!(ctx.metadata.truncated);
        let lines: Vec<&str> = ctx.comments.lines().collect();
        assert!(lines.len() <= LITE_MAX_COMMENTS);
        assert!(lines[0].starts_with("[score=39] u39:"));
        assert!(lines[0].ends_with("..."));
    }

    #[test]
    fn lite_mode_halves_comments_over_token_budget() {
        let comments: Vec<Value> = (0..30)
            .map(|i| comment("u", &"w".repeat(LITE_MAX_COMMENT_CHARS), i, 0, json!("")))
            .collect();
        let options = ExtractOptions {
            deep_scan: false,
            lite_mode: true,
        };

        let post = "p".repeat(LITE_MAX_POST_CHARS);
        let ctx = parse_thread("https://redd.it/abc123", &thread(&post, comments), options).unwrap();
        assert_eq!(ctx.comments.lines().count(), 15);
        assert!(ctx.token_count_groq <= LITE_MAX_TOTAL_TOKENS);
    }

    #[test]
    fn non_listing_body_is_invalid_url() {
        let err = parse_thread("https://x", &json!({"error": 404}), ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl(_)));
    }

    #[test]
    fn missing_post_is_not_found() {
        let body = json!([{"kind": "Listing", "data": {"children": []}}]);
        let err = parse_thread("https://x", &body, ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn listing_url_depends_on_scan_mode() {
        let thread = Url::parse("https://www.reddit.com/r/rust/comments/abc123/title/?utm=x").unwrap();

        let normal = listing_url(&thread, ExtractOptions::default());
        assert_eq!(normal.path(), "/r/rust/comments/abc123/title.json");
        assert!(normal.query().unwrap().contains("limit=200"));
        assert!(!normal.query().unwrap().contains("utm"));

        let deep = listing_url(
            &thread,
            ExtractOptions {
                deep_scan: true,
                lite_mode: false,
            },
        );
        assert!(deep.query().unwrap().contains("limit=500"));
    }

    #[tokio::test]
    async fn short_links_map_to_comments_endpoint() {
        let extractor = RedditExtractor::new("rdip-test").unwrap();
        let endpoint = extractor
            .json_endpoint("https://redd.it/abc123", ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(endpoint.path(), "/comments/abc123.json");
        assert_eq!(endpoint.host_str(), Some("www.reddit.com"));
    }

    #[tokio::test]
    async fn thread_links_are_rebased_on_base_url() {
        let extractor = RedditExtractor::new("rdip-test")
            .unwrap()
            .with_base_url("http://127.0.0.1:9/");
        let endpoint = extractor
            .json_endpoint(
                "https://old.reddit.com/r/rust/comments/abc123/title/",
                ExtractOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            endpoint.as_str(),
            "http://127.0.0.1:9/r/rust/comments/abc123/title.json?sort=top&limit=200&raw_json=1"
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_extraction() {
        let extractor = RedditExtractor::with_timeout("rdip-test", Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let err = extractor
            .extract("https://redd.it/abc123", ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::NetworkError(_) | AppError::HttpError(_)),
            "{err:?}"
        );
    }
}
