pub mod config;
pub mod database;
pub mod repository;

pub use config::CacheDbConfig;
pub use database::Database;
pub use repository::AnalysisRepository;
