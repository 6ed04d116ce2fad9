use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::job::{GroupId, Job, JobEvent, JobId};

/// Queue of accepted jobs waiting to be planned: ingestion pushes here,
/// the scheduler pops into its in-flight set.
///
/// `pop` returns the highest-priority job whose DAG in-degree is zero,
/// breaking ties by smaller group id (older groups first), then by insertion
/// order.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    jobs: Vec<Arc<Job>>,
    by_id: HashMap<JobId, Arc<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: Arc<Job>, group_id: GroupId) {
        let mut inner = self.inner.lock().unwrap();
        job.set_group_id(group_id);
        inner.by_id.insert(job.id(), job.clone());
        inner.jobs.push(job);
    }

    /// Bulk push preserving `jobs` order; all jobs join the same group.
    pub fn push_all(&self, jobs: Vec<Arc<Job>>, group_id: GroupId) {
        let mut inner = self.inner.lock().unwrap();
        for job in jobs {
            job.set_group_id(group_id);
            inner.by_id.insert(job.id(), job.clone());
            inner.jobs.push(job);
        }
    }

    /// Pop the next runnable job, if any.
    pub fn pop(&self) -> Option<Arc<Job>> {
        let mut inner = self.inner.lock().unwrap();

        let mut runnable: Vec<usize> = (0..inner.jobs.len())
            .filter(|&i| inner.jobs[i].num_depends() == 0)
            .collect();
        // stable: insertion order survives among equal keys
        runnable.sort_by_key(|&i| (-inner.jobs[i].priority(), inner.jobs[i].group_id()));

        let index = *runnable.first()?;
        let job = inner.jobs.remove(index);
        inner.by_id.remove(&job.id());
        Some(job)
    }

    pub fn get_by_id(&self, job_id: JobId) -> Option<Arc<Job>> {
        self.inner.lock().unwrap().by_id.get(&job_id).cloned()
    }

    /// Remove a queued job. Fires the deletion callback and releases DAG
    /// dependents: deletion unblocks successors exactly like success, so an
    /// admin-deleted predecessor can't wedge its group.
    pub fn delete(&self, job_id: JobId) -> bool {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.by_id.remove(&job_id).is_none() {
                return false;
            }
            let index = inner.jobs.iter().position(|j| j.id() == job_id);
            index.map(|i| inner.jobs.remove(i))
        };

        match removed {
            Some(job) => {
                let message = format!(
                    "Job deleted from job queue, jobId = {}\ncompletion status: failed",
                    job_id
                );
                tracing::info!(job_id, "job deleted from queue");
                job.run_callback(&JobEvent::Deleted { job_id, message });
                job.release_group();
                true
            }
            None => false,
        }
    }

    /// Delete every queued job of a group. Returns true if any was deleted.
    pub fn delete_group(&self, group_id: GroupId) -> bool {
        let ids: Vec<JobId> = {
            let inner = self.inner.lock().unwrap();
            inner
                .jobs
                .iter()
                .filter(|j| j.group_id() == group_id)
                .map(|j| j.id())
                .collect()
        };

        let mut deleted = false;
        for id in ids {
            deleted |= self.delete(id);
        }
        deleted
    }

    /// Queued job ids in insertion order.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.inner.lock().unwrap().jobs.iter().map(|j| j.id()).collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.clear();
        inner.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
