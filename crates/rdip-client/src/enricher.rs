//! Link enrichment: type detection, relevance scoring and page metadata.

use std::sync::LazyLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rdip_core::error::{AppError, truncate_chars};
use rdip_core::models::{EnrichedLink, LinkCandidate};
use rdip_core::traits::LinkEnricher;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::fetcher::HtmlFetcher;

const DEFAULT_MAX_CONCURRENT: usize = 5;
const MAX_HTML_BYTES: usize = 10_000;
const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 300;

const IMAGE: &str = "Image";
const PDF: &str = "PDF Document";
const SOCIAL: &str = "Social Media";
const HIGH_VALUE_TYPES: &[&str] = &["GitHub Repository", "Documentation", "Research Paper", "Q&A"];
const IMPORTANT_KEYWORDS: &[&str] = &["source", "official", "documentation", "tutorial", "guide"];

/// Link types by URL pattern, checked in order.
static LINK_TYPES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"github\.com", "GitHub Repository"),
        (r"youtube\.com|youtu\.be", "Video"),
        (r"twitter\.com|x\.com", SOCIAL),
        (r"reddit\.com", "Reddit Thread"),
        (r"arxiv\.org", "Research Paper"),
        (r"medium\.com", "Article"),
        (r"stackoverflow\.com", "Q&A"),
        (r"wikipedia\.org", "Encyclopedia"),
        (r"docs\.|documentation|readme", "Documentation"),
        (r"bbc\.|cnn\.|nytimes|reuters|theguardian", "News"),
        (r"\.(png|jpg|jpeg|gif|webp|svg)($|\?)", IMAGE),
        (r"\.pdf($|\?)", PDF),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid link type pattern"), label))
    .collect()
});

/// Enriches links by fetching the head of each page.
#[derive(Clone)]
pub struct HttpLinkEnricher {
    fetcher: HtmlFetcher,
    max_concurrent: usize,
}

impl HttpLinkEnricher {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self::with_fetcher(HtmlFetcher::with_timeout(
            Duration::from_secs(5),
        )?))
    }

    pub fn with_fetcher(fetcher: HtmlFetcher) -> Self {
        Self {
            fetcher,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    async fn enrich_one(&self, candidate: &LinkCandidate) -> EnrichedLink {
        let link_type = detect_link_type(&candidate.url);
        let domain = Url::parse(&candidate.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .map(|h| h.trim_start_matches("www.").to_string());

        let Some(domain) = domain else {
            tracing::warn!(url = %candidate.url, "Failed to enrich link");
            return EnrichedLink {
                link_type: link_type.to_string(),
                ..EnrichedLink::basic(candidate)
            };
        };

        let mut enriched = EnrichedLink {
            url: candidate.url.clone(),
            favicon: Some(favicon_url(&domain)),
            domain,
            link_type: link_type.to_string(),
            context: candidate.context.clone(),
            title: None,
            description: None,
            relevance: relevance(link_type, &candidate.context),
        };

        if link_type == IMAGE || link_type == PDF {
            return enriched;
        }

        match self.fetcher.fetch_html(&candidate.url, MAX_HTML_BYTES).await {
            Ok(Some(html)) => {
                let meta = parse_metadata(&html);
                enriched.title = meta.title;
                enriched.description = meta.description;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(url = %candidate.url, error = %e, "Metadata fetch failed");
            }
        }
        enriched
    }
}

impl LinkEnricher for HttpLinkEnricher {
    async fn enrich(&self, links: &[LinkCandidate]) -> Result<Vec<EnrichedLink>, AppError> {
        let pending: Vec<_> = links.iter().map(|c| self.enrich_one(c)).collect();
        let mut enriched: Vec<EnrichedLink> = stream::iter(pending)
            .buffered(self.max_concurrent)
            .collect()
            .await;

        enriched.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        Ok(enriched)
    }
}

fn detect_link_type(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    LINK_TYPES
        .iter()
        .find(|(re, _)| re.is_match(&lower))
        .map(|(_, label)| *label)
        .unwrap_or("Reference")
}

fn relevance(link_type: &str, context: &str) -> f64 {
    let mut score: f64 = 0.5;
    if HIGH_VALUE_TYPES.contains(&link_type) {
        score += 0.2;
    }
    if link_type == IMAGE || link_type == SOCIAL {
        score -= 0.1;
    }
    let context = context.to_lowercase();
    if IMPORTANT_KEYWORDS.iter().any(|kw| context.contains(kw)) {
        score += 0.15;
    }
    score.clamp(0.0, 1.0)
}

fn favicon_url(domain: &str) -> String {
    format!("https://www.google.com/s2/favicons?domain={domain}&sz=32")
}

#[derive(Debug, Default, PartialEq)]
struct PageMeta {
    title: Option<String>,
    description: Option<String>,
}

/// Title and description, preferring Open Graph tags.
fn parse_metadata(html: &str) -> PageMeta {
    let doc = Html::parse_document(html);

    let meta_content = |key: &str| -> Option<String> {
        let selector =
            Selector::parse(&format!(r#"meta[property="{key}"], meta[name="{key}"]"#)).ok()?;
        doc.select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
            .map(str::to_string)
    };

    let title_tag = Selector::parse("title").ok().and_then(|selector| {
        doc.select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    PageMeta {
        title: meta_content("og:title")
            .or(title_tag)
            .map(|t| truncate_chars(&t, MAX_TITLE_CHARS)),
        description: meta_content("og:description")
            .or_else(|| meta_content("description"))
            .map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS)),
    }
}
