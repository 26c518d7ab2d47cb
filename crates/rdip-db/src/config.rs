use rdip_core::AppError;

/// Default location of the durable cache database.
pub const DEFAULT_CACHE_DB: &str = "sqlite:data/cache_cold.db";

/// Configuration for the durable cache connection pool.
#[derive(Debug, Clone)]
pub struct CacheDbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for CacheDbConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CACHE_DB.to_string(),
            max_connections: 5,
        }
    }
}

impl CacheDbConfig {
    /// Read configuration from environment variables.
    ///
    /// - `RDIP_CACHE_DB` (optional, defaults to `sqlite:data/cache_cold.db`)
    /// - `RDIP_CACHE_DB_MAX_CONNECTIONS` (optional, defaults to 5)
    pub fn from_env() -> Result<Self, AppError> {
        let url = std::env::var("RDIP_CACHE_DB").unwrap_or_else(|_| DEFAULT_CACHE_DB.to_string());

        let max_connections = match std::env::var("RDIP_CACHE_DB_MAX_CONNECTIONS") {
            Err(_) => 5,
            Ok(raw) => {
                let parsed: u32 = raw.parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid RDIP_CACHE_DB_MAX_CONNECTIONS '{raw}': must be a positive integer"
                    ))
                })?;
                if parsed == 0 {
                    return Err(AppError::ConfigError(
                        "RDIP_CACHE_DB_MAX_CONNECTIONS must be at least 1".into(),
                    ));
                }
                parsed
            }
        };

        Ok(Self {
            url,
            max_connections,
        })
    }

    /// In-memory database, for tests and ephemeral runs.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}
