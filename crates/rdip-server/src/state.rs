use rdip_client::{HttpAnalysisService, RedditExtractor, build_service, build_service_with_extractor};
use rdip_core::{AppError, Settings};
use rdip_db::{AnalysisRepository, Database};

/// The analysis service wired with its production collaborators.
pub type RdipService = HttpAnalysisService<AnalysisRepository>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub service: RdipService,
}

impl AppState {
    /// Build the service from settings, with the durable cache tier in `db`.
    pub fn build(settings: &Settings, db: &Database) -> Result<Self, AppError> {
        Ok(Self {
            service: build_service(settings, db.analysis_repo())?,
        })
    }

    /// Like [`build`](Self::build) with a caller-supplied extractor.
    pub fn with_extractor(
        settings: &Settings,
        db: &Database,
        extractor: RedditExtractor,
    ) -> Result<Self, AppError> {
        Ok(Self {
            service: build_service_with_extractor(settings, extractor, db.analysis_repo())?,
        })
    }
}
