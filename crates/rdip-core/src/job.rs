use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MAX_ERROR_LEN, truncate_chars};
use crate::models::{AnalysisResult, ExtractOptions};

/// Job id reported for submissions answered straight from the cache.
pub const CACHE_JOB_ID: &str = "cache";

/// Status of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Pipeline milestones and the progress each one reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Started,
    Extracted,
    Analyzed,
    Enriched,
    Assembled,
    Completed,
}

impl Stage {
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Started => 10,
            Stage::Extracted => 35,
            Stage::Analyzed => 70,
            Stage::Enriched => 85,
            Stage::Assembled => 95,
            Stage::Completed => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Started => "started",
            Stage::Extracted => "extracted",
            Stage::Analyzed => "analyzed",
            Stage::Enriched => "enriched",
            Stage::Assembled => "assembled",
            Stage::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable state of one analysis job.
///
/// `result` is set only once the job is completed and `error` only once it
/// has failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly submitted job.
    pub fn queued(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A completed descriptor for a submission answered by the cache.
    pub fn cached(result: AnalysisResult) -> Self {
        Self {
            job_id: CACHE_JOB_ID.to_string(),
            status: JobStatus::Completed,
            progress: 100,
            result: Some(result),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Move to `processing` at the given stage. Progress never goes backwards.
    pub fn advance(&mut self, stage: Stage) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Processing;
        self.progress = self.progress.max(stage.progress());
    }

    pub fn complete(&mut self, result: AnalysisResult) {
        self.status = JobStatus::Completed;
        self.progress = Stage::Completed.progress();
        self.result = Some(result);
        self.error = None;
    }

    /// Mark failed, keeping at most [`MAX_ERROR_LEN`] characters of the message.
    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(truncate_chars(error, MAX_ERROR_LEN));
    }
}

/// Request to analyze one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub deep_scan: bool,
    #[serde(default)]
    pub lite_mode: bool,
}

impl AnalyzeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            force_refresh: false,
            deep_scan: false,
            lite_mode: false,
        }
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn with_deep_scan(mut self, deep: bool) -> Self {
        self.deep_scan = deep;
        self
    }

    pub fn with_lite_mode(mut self, lite: bool) -> Self {
        self.lite_mode = lite;
        self
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            deep_scan: self.deep_scan,
            lite_mode: self.lite_mode,
        }
    }
}

/// Configuration for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on a single thread extraction.
    pub extract_timeout: Duration,
    /// Upper bound on enriching the link list of one job.
    pub enrich_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extract_timeout: Duration::from_secs(60),
            enrich_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout = timeout;
        self
    }
}
