//! Runtime settings read from the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::AppError;
use crate::job::PipelineConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::rate_limit::RateLimitConfig;

pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_USER_AGENT: &str = "rdip/0.3 (thread analysis)";

/// Settings shared by the server and the CLI.
#[derive(Debug, Clone)]
pub struct Settings {
    pub groq_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub groq_model: String,
    pub gemini_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub groq_rpm_limit: u32,
    pub gemini_rpm_limit: u32,
    /// Token ceiling above which the primary provider is skipped.
    pub groq_max_tokens: usize,
    pub llm_timeout: Duration,
    pub extract_timeout: Duration,
    pub hot_cache_ttl: Duration,
    pub job_ttl: Duration,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            google_api_key: None,
            groq_model: DEFAULT_GROQ_MODEL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            temperature: 0.4,
            max_tokens: 2200,
            groq_rpm_limit: 150,
            gemini_rpm_limit: 8,
            groq_max_tokens: 120_000,
            llm_timeout: Duration::from_secs(120),
            extract_timeout: Duration::from_secs(60),
            hot_cache_ttl: Duration::from_secs(86_400),
            job_ttl: Duration::from_secs(3600),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// Every variable is optional; unset keys keep their defaults and
    /// empty API keys count as unset.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: Duration| -> Result<Duration, AppError> {
            Ok(match parse::<u64, _>(&lookup, key)? {
                Some(0) => {
                    return Err(AppError::ConfigError(format!("{key} must be at least 1")));
                }
                Some(n) => Duration::from_secs(n),
                None => default,
            })
        };

        let temperature = parse::<f32, _>(&lookup, "LLM_TEMPERATURE")?.unwrap_or(defaults.temperature);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AppError::ConfigError(format!(
                "Invalid LLM_TEMPERATURE '{temperature}': must be between 0 and 2"
            )));
        }

        Ok(Self {
            groq_api_key: secret("GROQ_API_KEY"),
            google_api_key: secret("GOOGLE_API_KEY"),
            groq_model: lookup("GROQ_MODEL").unwrap_or(defaults.groq_model),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            temperature,
            max_tokens: parse(&lookup, "LLM_MAX_TOKENS")?.unwrap_or(defaults.max_tokens),
            groq_rpm_limit: parse(&lookup, "GROQ_RPM_LIMIT")?.unwrap_or(defaults.groq_rpm_limit),
            gemini_rpm_limit: parse(&lookup, "GEMINI_RPM_LIMIT")?
                .unwrap_or(defaults.gemini_rpm_limit),
            groq_max_tokens: parse(&lookup, "GROQ_MAX_TOKENS")?.unwrap_or(defaults.groq_max_tokens),
            llm_timeout: secs("LLM_TIMEOUT_SECS", defaults.llm_timeout)?,
            extract_timeout: secs("EXTRACT_TIMEOUT_SECS", defaults.extract_timeout)?,
            hot_cache_ttl: secs("HOT_CACHE_TTL", defaults.hot_cache_ttl)?,
            job_ttl: secs("JOB_TTL_SECONDS", defaults.job_ttl)?,
            user_agent: lookup("REDDIT_USER_AGENT").unwrap_or(defaults.user_agent),
        })
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.groq_rpm_limit, self.gemini_rpm_limit)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..OrchestratorConfig::default()
        }
        .with_call_timeout(self.llm_timeout)
        .with_primary_token_ceiling(self.groq_max_tokens)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default().with_hot_ttl(self.hot_cache_ttl)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default().with_extract_timeout(self.extract_timeout)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            AppError::ConfigError(format!("Invalid {key} '{raw}': could not parse value"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, AppError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let s = settings(&[]).unwrap();
        assert!(s.groq_api_key.is_none());
        assert_eq!(s.groq_model, DEFAULT_GROQ_MODEL);
        assert_eq!(s.groq_rpm_limit, 150);
        assert_eq!(s.gemini_rpm_limit, 8);
        assert_eq!(s.job_ttl, Duration::from_secs(3600));
        assert_eq!(s.orchestrator_config().primary_token_ceiling, 120_000);
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("GEMINI_RPM_LIMIT", "20"),
            ("LLM_TIMEOUT_SECS", "30"),
            ("LLM_TEMPERATURE", "0.1"),
        ])
        .unwrap();
        assert_eq!(s.groq_api_key.as_deref(), Some("gsk_test"));
        assert_eq!(s.gemini_rpm_limit, 20);

        let orchestrator = s.orchestrator_config();
        assert_eq!(orchestrator.call_timeout, Duration::from_secs(30));
        assert!((orchestrator.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn blank_api_key_is_unset() {
        let s = settings(&[("GOOGLE_API_KEY", "  ")]).unwrap();
        assert!(s.google_api_key.is_none());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for pair in [
            ("GROQ_RPM_LIMIT", "lots"),
            ("JOB_TTL_SECONDS", "0"),
            ("LLM_TEMPERATURE", "7"),
        ] {
            let err = settings(&[pair]).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{pair:?}");
        }
    }
}
