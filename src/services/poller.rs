//! Cancellable poll tasks, at most one live task per job id.
//!
//! Starting a poll for a job that already has one aborts the old task first.
//! Each task receives a [`PollToken`] it must consult before applying a
//! response, so a response that arrives after its task was superseded or
//! cancelled is dropped instead of mutating state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;
use tracing::debug;

#[derive(Debug)]
struct ActivePoll {
    generation: u64,
    abort: Option<AbortHandle>,
}

type ActiveMap = Arc<Mutex<HashMap<String, ActivePoll>>>;

fn lock(map: &ActiveMap) -> MutexGuard<'_, HashMap<String, ActivePoll>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Identity of one poll cycle, handed to the task it drives.
#[derive(Debug, Clone)]
pub struct PollToken {
    job_id: String,
    generation: u64,
    active: ActiveMap,
}

impl PollToken {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Whether this cycle is still the live one for its job.
    pub fn is_current(&self) -> bool {
        lock(&self.active)
            .get(&self.job_id)
            .is_some_and(|a| a.generation == self.generation)
    }

    /// Deregister after reaching a terminal state.
    pub fn finish(self) {
        let mut active = lock(&self.active);
        if active.get(&self.job_id).is_some_and(|a| a.generation == self.generation) {
            active.remove(&self.job_id);
        }
    }
}

/// Caller-side handle to a started poll cycle.
#[derive(Debug)]
pub struct PollHandle {
    job_id: String,
    generation: u64,
    active: ActiveMap,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel this cycle if it is still the live one.
    pub fn cancel(&self) -> bool {
        let mut active = lock(&self.active);
        match active.get(&self.job_id) {
            Some(a) if a.generation == self.generation => {
                if let Some(abort) = &a.abort {
                    abort.abort();
                }
                active.remove(&self.job_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.active)
            .get(&self.job_id)
            .is_some_and(|a| a.generation == self.generation)
    }
}

#[derive(Debug, Default)]
pub struct PollScheduler {
    active: ActiveMap,
    next_generation: AtomicU64,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` as the poll cycle for `job_id`, cancelling any cycle
    /// already running for it.
    pub fn start<F, Fut>(&self, job_id: &str, task: F) -> PollHandle
    where
        F: FnOnce(PollToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut active = lock(&self.active);
            if let Some(previous) = active.insert(
                job_id.to_string(),
                ActivePoll {
                    generation,
                    abort: None,
                },
            ) {
                if let Some(abort) = previous.abort {
                    abort.abort();
                }
                debug!(job_id, superseded = previous.generation, "Cancelled previous poll cycle");
            }
        }

        let token = PollToken {
            job_id: job_id.to_string(),
            generation,
            active: Arc::clone(&self.active),
        };
        let join = tokio::spawn(task(token));

        {
            let mut active = lock(&self.active);
            match active.get_mut(job_id) {
                Some(entry) if entry.generation == generation => entry.abort = Some(join.abort_handle()),
                // Finished or superseded before we got here.
                _ => {}
            }
        }

        PollHandle {
            job_id: job_id.to_string(),
            generation,
            active: Arc::clone(&self.active),
        }
    }

    /// Cancel the live cycle for `job_id`, if any.
    pub fn cancel(&self, job_id: &str) -> bool {
        match lock(&self.active).remove(job_id) {
            Some(entry) => {
                if let Some(abort) = entry.abort {
                    abort.abort();
                }
                debug!(job_id, "Cancelled poll cycle");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut active = lock(&self.active);
        for (_, entry) in active.drain() {
            if let Some(abort) = entry.abort {
                abort.abort();
            }
        }
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        lock(&self.active).contains_key(job_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
