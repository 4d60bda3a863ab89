//! In-memory job registry. Jobs live for the duration of the process;
//! listing also surfaces finalized transcript files found on disk for
//! backward compatibility with pre-registry deployments.

use crate::job::{Job, JobStatus};
use crate::request::DubbingRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Summary row returned by listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Job>>,
    cancel_flags: RwLock<HashMap<String, Arc<AtomicBool>>>,
    data_dir: PathBuf,
}

impl JobRegistry {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            cancel_flags: RwLock::new(HashMap::new()),
            data_dir,
        }
    }

    /// 128-bit random hex job id.
    pub fn new_job_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Create a job in `Pending` state and register its cancellation flag.
    pub fn create(&self, request: DubbingRequest) -> Job {
        let job_id = Self::new_job_id();
        let job = Job::new(job_id.clone(), request);

        self.jobs
            .write()
            .unwrap()
            .insert(job_id.clone(), job.clone());
        self.cancel_flags
            .write()
            .unwrap()
            .insert(job_id.clone(), Arc::new(AtomicBool::new(false)));

        info!("Created job {job_id}");
        job
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().unwrap().get(job_id).cloned()
    }

    /// Apply a mutation to one job. Updates within a job are serialized by
    /// that job's owning task; this lock is held only briefly.
    pub fn update<F>(&self, job_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(job_id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Cancellation flag for a job, shared with its running task.
    pub fn cancel_flag(&self, job_id: &str) -> Option<Arc<AtomicBool>> {
        self.cancel_flags.read().unwrap().get(job_id).cloned()
    }

    /// Request cooperative cancellation of a non-terminal job. The running
    /// task observes the flag at its next checkpoint.
    pub fn cancel(&self, job_id: &str) -> bool {
        let Some(job) = self.get(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        if let Some(flag) = self.cancel_flag(job_id) {
            info!("Cancellation requested for job {job_id}");
            flag.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// List jobs most-recent first, merged with finalized transcript files
    /// on disk that no in-memory job references.
    pub fn list(&self, limit: usize, offset: usize) -> (Vec<JobSummary>, usize) {
        let mut summaries: Vec<JobSummary> = {
            let jobs = self.jobs.read().unwrap();
            jobs.values()
                .map(|job| JobSummary {
                    job_id: job.job_id.clone(),
                    status: job.status,
                    progress: job.progress,
                    created_at: Some(job.created_at),
                })
                .collect()
        };

        let known: std::collections::HashSet<String> =
            summaries.iter().map(|s| s.job_id.clone()).collect();

        for job_id in self.finalized_transcript_ids() {
            if !known.contains(&job_id) {
                summaries.push(JobSummary {
                    job_id,
                    status: JobStatus::Completed,
                    progress: 100,
                    created_at: None,
                });
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = summaries.len();
        let page = summaries.into_iter().skip(offset).take(limit).collect();
        (page, total)
    }

    /// Remove a job record and its finalized transcript file, if present.
    /// Returns what was deleted.
    pub fn delete(&self, job_id: &str) -> Vec<&'static str> {
        let mut deleted = Vec::new();

        if self.jobs.write().unwrap().remove(job_id).is_some() {
            deleted.push("job_record");
        }
        self.cancel_flags.write().unwrap().remove(job_id);

        let transcript = self.data_dir.join(format!("transcript_{job_id}.txt"));
        if transcript.exists() && std::fs::remove_file(&transcript).is_ok() {
            deleted.push("transcript_file");
        }

        if !deleted.is_empty() {
            debug!("Deleted job {job_id}: {deleted:?}");
        }
        deleted
    }

    fn finalized_transcript_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.data_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_prefix("transcript_")
                    .and_then(|rest| rest.strip_suffix(".txt"))
                    .map(|id| id.to_string())
            })
            .collect()
    }
}
