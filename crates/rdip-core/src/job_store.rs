//! In-memory job tracking with lazy TTL expiry.
//!
//! Every public operation first sweeps entries older than the configured TTL,
//! so no background timer is needed and an expired job is never observable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::job::{JobRecord, JobStatus};

/// Default time a job stays visible after creation.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(3600);

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl JobStats {
    /// Jobs that have not reached a terminal status.
    pub fn active(&self) -> usize {
        self.queued + self.processing
    }
}

struct Entry {
    record: JobRecord,
    inserted_at: Instant,
}

/// Shared map of job id to job record.
///
/// Cheap to clone; all clones see the same jobs.
#[derive(Clone)]
pub struct JobTracker {
    ttl: Duration,
    jobs: Arc<Mutex<HashMap<String, Entry>>>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_TTL)
    }
}

impl JobTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Acquires the map lock and drops expired entries.
    fn lock_swept(&self) -> (MutexGuard<'_, HashMap<String, Entry>>, usize) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned job map");
            poisoned.into_inner()
        });
        let before = jobs.len();
        let ttl = self.ttl;
        jobs.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::debug!(removed, "Expired jobs swept");
        }
        (jobs, removed)
    }

    /// Insert a new job, replacing any existing record with the same id.
    pub fn create(&self, record: JobRecord) {
        let (mut jobs, _) = self.lock_swept();
        jobs.insert(
            record.job_id.clone(),
            Entry {
                record,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        let (jobs, _) = self.lock_swept();
        jobs.get(job_id).map(|e| e.record.clone())
    }

    /// Replace the record of an existing job. Returns false, without
    /// inserting, when the id is unknown or has expired.
    pub fn update(&self, record: JobRecord) -> bool {
        let (mut jobs, _) = self.lock_swept();
        match jobs.get_mut(&record.job_id) {
            Some(entry) => {
                entry.record = record;
                true
            }
            None => false,
        }
    }

    /// Apply `f` to a stored record in place. Returns the updated record.
    pub fn modify<F>(&self, job_id: &str, f: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let (mut jobs, _) = self.lock_swept();
        jobs.get_mut(job_id).map(|entry| {
            f(&mut entry.record);
            entry.record.clone()
        })
    }

    pub fn remove(&self, job_id: &str) -> bool {
        let (mut jobs, _) = self.lock_swept();
        jobs.remove(job_id).is_some()
    }

    /// Drop expired jobs. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let (jobs, removed) = self.lock_swept();
        drop(jobs);
        removed
    }

    pub fn stats(&self) -> JobStats {
        let (jobs, _) = self.lock_swept();
        let mut stats = JobStats {
            total: jobs.len(),
            ..Default::default()
        };
        for entry in jobs.values() {
            match entry.record.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// List jobs newest first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<JobRecord> {
        let (jobs, _) = self.lock_swept();
        let mut records: Vec<_> = jobs
            .values()
            .filter(|e| status.is_none_or(|s| e.record.status == s))
            .map(|e| (e.inserted_at, e.record.clone()))
            .collect();
        records.sort_by(|a, b| b.0.cmp(&a.0));
        records.into_iter().take(limit).map(|(_, r)| r).collect()
    }

    /// Remove every job. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let (mut jobs, _) = self.lock_swept();
        let count = jobs.len();
        jobs.clear();
        count
    }
}
