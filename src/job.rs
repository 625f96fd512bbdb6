//! Job records and the in-memory job store.
//!
//! The store owns every `Job`; workers and HTTP handlers only touch job
//! fields through its methods, each of which holds the lock for a single
//! field-set or log-append. Nothing awaits while the lock is held.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Upper bound on retained log lines per job.
pub const LOG_KEEP_MAX: usize = 1200;
/// Oldest block dropped in one go once the bound is exceeded, so appends stay
/// cheap instead of trimming on every line.
const LOG_DROP_CHUNK: usize = 400;
/// Lines exposed in the external view.
const LOG_VIEW_TAIL: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A file produced by a job. `path` is internal only and never serialized;
/// clients address artifacts by `id`.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
    pub label: String,
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub tool: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// -1 means the process never produced an exit code.
    pub return_code: Option<i32>,
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub artifacts: Vec<Artifact>,
}

impl Job {
    fn new(id: String, tool: String) -> Self {
        Self {
            id,
            tool,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            return_code: None,
            error: None,
            logs: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn append_log(&mut self, line: &str) {
        let clean = line.trim_end_matches(['\r', '\n']);
        if clean.is_empty() {
            return;
        }
        self.logs.push(clean.to_string());
        if self.logs.len() > LOG_KEEP_MAX {
            self.logs.drain(..LOG_DROP_CHUNK);
        }
    }

    /// Registers an artifact, de-duplicated by resolved path.
    pub fn register_artifact(&mut self, label: &str, path: PathBuf) {
        if self.artifacts.iter().any(|a| a.path == path) {
            return;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        self.artifacts.push(Artifact {
            id,
            label: label.to_string(),
            name,
            path,
        });
    }

    fn view(&self) -> JobView {
        let tail = self.logs.len().saturating_sub(LOG_VIEW_TAIL);
        JobView {
            id: self.id.clone(),
            tool: self.tool.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            return_code: self.return_code,
            error: self.error.clone(),
            logs: self.logs[tail..].to_vec(),
            artifacts: self
                .artifacts
                .iter()
                .map(|a| ArtifactView {
                    id: a.id.clone(),
                    label: a.label.clone(),
                    name: a.name.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArtifactView {
    pub id: String,
    pub label: String,
    pub name: String,
}

/// The external, client-facing snapshot of a job.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub tool: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub return_code: Option<i32>,
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub artifacts: Vec<ArtifactView>,
}

/// In-memory job storage. Handlers and workers share it as `Arc<JobStore>`;
/// tests construct their own instance.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new queued job and returns its id.
    pub fn create(&self, tool: &str) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let job = Job::new(id.clone(), tool.to_string());
        self.jobs.lock().unwrap().insert(id.clone(), job);
        id
    }

    pub fn view(&self, id: &str) -> Option<JobView> {
        self.jobs.lock().unwrap().get(id).map(Job::view)
    }

    pub fn tool_of(&self, id: &str) -> Option<String> {
        self.jobs.lock().unwrap().get(id).map(|j| j.tool.clone())
    }

    /// Runs `f` on the job under the store lock.
    pub fn with_job<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.jobs.lock().unwrap().get_mut(id).map(f)
    }

    pub fn mark_running(&self, id: &str) {
        self.with_job(id, |job| {
            if job.status == JobStatus::Queued {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
            }
        });
    }

    /// Terminal transition, applied atomically. A no-op if the job already
    /// finished; status never regresses.
    pub fn finish(&self, id: &str, return_code: i32, error: Option<String>) {
        self.with_job(id, |job| {
            if job.status.is_terminal() {
                return;
            }
            job.return_code = Some(return_code);
            job.finished_at = Some(Utc::now());
            job.status = if return_code == 0 && error.is_none() {
                JobStatus::Succeeded
            } else {
                JobStatus::Failed
            };
            job.error = error;
        });
    }

    pub fn append_log(&self, id: &str, line: &str) {
        self.with_job(id, |job| job.append_log(line));
    }

    pub fn register_artifact(&self, id: &str, label: &str, path: PathBuf) {
        self.with_job(id, |job| job.register_artifact(label, path));
    }

    /// Jobs still queued or running; the admission gate counts these.
    pub fn active_jobs(&self) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| !j.status.is_terminal())
            .count()
    }

    /// Internal path, download name, and owning tool for an artifact, if it
    /// belongs to the given job.
    pub fn artifact(&self, job_id: &str, artifact_id: &str) -> Option<(PathBuf, String, String)> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs.get(job_id)?;
        let artifact = job.artifacts.iter().find(|a| a.id == artifact_id)?;
        Some((artifact.path.clone(), artifact.name.clone(), job.tool.clone()))
    }

    /// Drops jobs finished before the retention window and returns their ids
    /// so the caller can remove the matching sandbox directories. Cheap and
    /// idempotent; called on ordinary request traffic.
    pub fn sweep(&self, retention: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let stale: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| match job.finished_at {
                Some(finished) => now
                    .signed_duration_since(finished)
                    .to_std()
                    .map(|age| age > retention)
                    .unwrap_or(false),
                None => false,
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            jobs.remove(id);
        }
        stale
    }
}
