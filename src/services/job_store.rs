//! The session's job list: the one piece of shared mutable client state.
//!
//! All mutation goes through [`JobStore::add`], [`JobStore::update`],
//! [`JobStore::replace_id`] and [`JobStore::remove`]. The list is only
//! replaced wholesale by [`JobStore::resync`], when resynchronizing from the
//! server.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::api::JobSummary;
use crate::models::job::Job;

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Vec<Job>,
    current: Option<String>,
}

/// Handle shared between the lifecycle driver and views.
pub type SharedJobStore = Arc<RwLock<JobStore>>;

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedJobStore {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Newest jobs first.
    pub fn add(&mut self, job: Job) {
        self.jobs.insert(0, job);
    }

    /// Apply `f` to the job with `id`. Returns `false` if no such job exists.
    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        match self.jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Swap a placeholder id for the server-assigned one. The current-job
    /// pointer follows the rename.
    pub fn replace_id(&mut self, old_id: &str, new_id: &str) -> bool {
        let replaced = self.update(old_id, |job| job.id = new_id.to_string());
        if replaced && self.current.as_deref() == Some(old_id) {
            self.current = Some(new_id.to_string());
        }
        replaced
    }

    /// Replace the list with the server's view. Jobs already held locally keep
    /// their results; jobs the server does not know about yet (still under a
    /// placeholder id) are kept.
    pub fn resync(&mut self, summaries: Vec<JobSummary>) {
        let mut previous = std::mem::take(&mut self.jobs);
        let mut jobs: Vec<Job> = previous
            .iter()
            .filter(|j| j.is_placeholder())
            .cloned()
            .collect();

        for summary in summaries {
            match previous.iter().position(|j| j.id == summary.id) {
                Some(pos) => {
                    let mut job = previous.swap_remove(pos);
                    if !job.is_terminal() {
                        job.status = summary.status;
                    }
                    jobs.push(job);
                }
                None => jobs.push(Job {
                    id: summary.id,
                    filename: summary.filename,
                    model: summary.model,
                    model_options: summary.model_options,
                    status: summary.status,
                    created_at: summary.created_at,
                    processing_time_ms: None,
                    storage_key: Some(summary.artifact_key),
                    result: None,
                    error: None,
                }),
            }
        }

        if let Some(current) = &self.current {
            if !jobs.iter().any(|j| &j.id == current) {
                self.current = None;
            }
        }
        self.jobs = jobs;
    }

    /// Drop a deleted job. Clears the current pointer if it pointed there.
    pub fn remove(&mut self, id: &str) -> Option<Job> {
        let pos = self.jobs.iter().position(|j| j.id == id)?;
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
        Some(self.jobs.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Job> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    /// Point the view at a job (or at nothing). Returns the previous pointer.
    pub fn select(&mut self, id: Option<&str>) -> Option<String> {
        std::mem::replace(&mut self.current, id.map(str::to_string))
    }
}
