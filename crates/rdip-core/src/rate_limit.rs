//! Per-provider rolling-window admission control.
//!
//! Each provider keeps the timestamps of its recent calls. Before every read
//! or write, timestamps older than the window are evicted from the front, so
//! `admit` answers "fewer than `limit` calls in the trailing window?".
//!
//! Usage is attempt-based: callers `record` immediately after a positive
//! `admit`, before the remote call is made.
//!
//! # Example
//!
//! ```rust
//! use rdip_core::models::Provider;
//! use rdip_core::rate_limit::{RateLimitConfig, RateLimiter};
//!
//! # async fn run() {
//! let limiter = RateLimiter::new(RateLimitConfig::new(150, 8));
//! if limiter.admit(Provider::Groq).await {
//!     limiter.record(Provider::Groq).await;
//!     // call the provider
//! }
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::models::Provider;

/// Configuration for the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Calls allowed per window, per provider.
    pub limits: HashMap<Provider, u32>,

    /// Length of the rolling window.
    pub window: Duration,

    /// How often [`RateLimiter::wait_for`] re-checks admission.
    pub poll_interval: Duration,
}

impl RateLimitConfig {
    /// Per-minute limits for the primary (Groq) and secondary (Gemini) providers.
    pub fn new(groq_rpm: u32, gemini_rpm: u32) -> Self {
        Self {
            limits: HashMap::from([(Provider::Groq, groq_rpm), (Provider::Gemini, gemini_rpm)]),
            window: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(150, 8)
    }
}

/// Usage of one provider within the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderUsage {
    pub provider: Provider,
    pub used: u32,
    pub limit: u32,
    pub available: u32,
}

#[derive(Debug)]
struct RateWindow {
    limit: u32,
    calls: VecDeque<Instant>,
}

impl RateWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            calls: VecDeque::with_capacity(Self::capacity_for(limit)),
        }
    }

    /// Hard bound on stored timestamps, so stray `record` calls cannot grow
    /// the window without limit.
    fn capacity_for(limit: u32) -> usize {
        (limit as usize).max(1) * 2
    }

    fn evict(&mut self, window: Duration) {
        let now = Instant::now();
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn used(&self) -> u32 {
        self.calls.len().min(u32::MAX as usize) as u32
    }

    fn push(&mut self) {
        if self.calls.len() >= Self::capacity_for(self.limit) {
            self.calls.pop_front();
        }
        self.calls.push_back(Instant::now());
    }
}

/// Rolling-window rate limiter shared by all jobs.
///
/// Cheap to clone; all clones share the same windows. A single async mutex
/// covers each evict-check-append sequence.
#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    poll_interval: Duration,
    windows: Arc<Mutex<HashMap<Provider, RateWindow>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let windows = config
            .limits
            .iter()
            .map(|(provider, limit)| (*provider, RateWindow::new(*limit)))
            .collect();
        Self {
            window: config.window,
            poll_interval: config.poll_interval,
            windows: Arc::new(Mutex::new(windows)),
        }
    }

    /// Whether one more call to `provider` fits in the current window.
    ///
    /// Providers without a configured limit are never admitted.
    pub async fn admit(&self, provider: Provider) -> bool {
        let mut windows = self.windows.lock().await;
        let Some(w) = windows.get_mut(&provider) else {
            tracing::warn!(%provider, "No rate limit configured for provider");
            return false;
        };
        w.evict(self.window);
        let admitted = w.used() < w.limit;
        if !admitted {
            tracing::warn!(
                %provider,
                used = w.used(),
                limit = w.limit,
                "Rate limit window full"
            );
        }
        admitted
    }

    /// Record one call attempt against `provider`.
    pub async fn record(&self, provider: Provider) {
        let mut windows = self.windows.lock().await;
        if let Some(w) = windows.get_mut(&provider) {
            w.evict(self.window);
            w.push();
        }
    }

    /// Admit and record in one step under a single lock.
    ///
    /// Returns false without recording when the window is full.
    pub async fn try_acquire(&self, provider: Provider) -> bool {
        let mut windows = self.windows.lock().await;
        let Some(w) = windows.get_mut(&provider) else {
            tracing::warn!(%provider, "No rate limit configured for provider");
            return false;
        };
        w.evict(self.window);
        if w.used() < w.limit {
            w.push();
            true
        } else {
            tracing::warn!(
                %provider,
                used = w.used(),
                limit = w.limit,
                "Rate limit window full"
            );
            false
        }
    }

    /// Per-provider usage, ordered by provider.
    pub async fn stats(&self) -> Vec<ProviderUsage> {
        let mut windows = self.windows.lock().await;
        let mut usage: Vec<_> = windows
            .iter_mut()
            .map(|(provider, w)| {
                w.evict(self.window);
                ProviderUsage {
                    provider: *provider,
                    used: w.used(),
                    limit: w.limit,
                    available: w.limit.saturating_sub(w.used()),
                }
            })
            .collect();
        usage.sort_by_key(|u| u.provider);
        usage
    }

    /// Poll [`admit`](Self::admit) until it succeeds or `timeout` elapses.
    pub async fn wait_for(&self, provider: Provider, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.admit(provider).await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(%provider, timeout_ms = %timeout.as_millis(), "Timed out waiting for rate limit");
                return false;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(groq: u32, gemini: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig::new(groq, gemini)
                .with_window(Duration::from_millis(window_ms))
                .with_poll_interval(Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn admits_up_to_limit() {
        let limiter = limiter(5, 2, 60_000);

        for _ in 0..5 {
            assert!(limiter.admit(Provider::Groq).await);
            limiter.record(Provider::Groq).await;
        }
        assert!(!limiter.admit(Provider::Groq).await);
    }

    #[tokio::test]
    async fn providers_are_independent() {
        let limiter = limiter(5, 2, 60_000);

        limiter.record(Provider::Gemini).await;
        limiter.record(Provider::Gemini).await;

        assert!(!limiter.admit(Provider::Gemini).await);
        assert!(limiter.admit(Provider::Groq).await);
    }

    #[tokio::test]
    async fn window_expiry_readmits() {
        let limiter = limiter(2, 2, 50);

        limiter.record(Provider::Groq).await;
        limiter.record(Provider::Groq).await;
        assert!(!limiter.admit(Provider::Groq).await);

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(limiter.admit(Provider::Groq).await);
    }

    #[tokio::test]
    async fn stats_are_accurate() {
        let limiter = limiter(5, 2, 60_000);
        limiter.record(Provider::Groq).await;
        limiter.record(Provider::Groq).await;
        limiter.record(Provider::Gemini).await;

        let stats = limiter.stats().await;
        assert_eq!(
            stats,
            vec![
                ProviderUsage {
                    provider: Provider::Groq,
                    used: 2,
                    limit: 5,
                    available: 3,
                },
                ProviderUsage {
                    provider: Provider::Gemini,
                    used: 1,
                    limit: 2,
                    available: 1,
                },
            ]
        );
    }

    #[tokio::test]
    async fn available_saturates_at_zero() {
        let limiter = limiter(1, 1, 60_000);
        for _ in 0..3 {
            limiter.record(Provider::Groq).await;
        }
        let groq = limiter.stats().await[0];
        assert_eq!(groq.used, 2);
        assert_eq!(groq.available, 0);
    }

    #[tokio::test]
    async fn try_acquire_records_only_when_admitted() {
        let limiter = limiter(1, 1, 60_000);
        assert!(limiter.try_acquire(Provider::Gemini).await);
        assert!(!limiter.try_acquire(Provider::Gemini).await);
        assert_eq!(limiter.stats().await[1].used, 1);
    }

    #[tokio::test]
    async fn unconfigured_provider_is_rejected() {
        let limiter = RateLimiter::new(RateLimitConfig {
            limits: HashMap::from([(Provider::Groq, 3)]),
            window: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
        });
        assert!(!limiter.admit(Provider::Gemini).await);
        assert!(!limiter.try_acquire(Provider::Gemini).await);
    }

    #[tokio::test]
    async fn wait_for_returns_once_window_frees() {
        let limiter = limiter(1, 1, 60);
        limiter.record(Provider::Groq).await;

        let start = Instant::now();
        assert!(limiter.wait_for(Provider::Groq, Duration::from_secs(1)).await);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let limiter = limiter(1, 1, 60_000);
        limiter.record(Provider::Groq).await;

        let start = Instant::now();
        assert!(!limiter.wait_for(Provider::Groq, Duration::from_millis(50)).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn clones_share_windows() {
        let limiter = limiter(1, 1, 60_000);
        let other = limiter.clone();
        limiter.record(Provider::Groq).await;
        assert!(!other.admit(Provider::Groq).await);
    }
}
