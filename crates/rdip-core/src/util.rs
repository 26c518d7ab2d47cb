use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

static THREAD_URL_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"^https?://(?:www\.)?reddit\.com/r/[A-Za-z0-9_]+/comments/[A-Za-z0-9]+",
        r"^https?://redd\.it/[A-Za-z0-9]+",
        r"^https?://old\.reddit\.com/r/[A-Za-z0-9_]+/comments/[A-Za-z0-9]+",
        r"^https?://(?:www\.)?reddit\.com/r/[A-Za-z0-9_]+/s/[A-Za-z0-9]+",
    ]
    .map(|p| Regex::new(p).expect("valid thread URL pattern"))
});

/// Check that `url` points at a discussion thread.
///
/// Returns the trimmed URL without trailing slashes.
pub fn validate_thread_url(url: &str) -> Result<String, AppError> {
    let trimmed = url.trim().trim_end_matches('/');
    if THREAD_URL_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
        Ok(trimmed.to_string())
    } else {
        Err(AppError::InvalidUrl(url.trim().to_string()))
    }
}
