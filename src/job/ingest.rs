//! Job ingestion: JSON job descriptions and meta-job (DAG) descriptions
//! become queued [`Job`]s.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::job::{
    build_job_group, parse_meta_chains, Job, JobLimits, JobParams, JobQueue, JobTimeouts,
};
use crate::scheduler::timeout::TimeoutSink;
use crate::scheduler::Scheduler;

/// On-disk job description. `script` names the script file, resolved
/// against the jobs directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescription {
    pub script: String,
    pub language: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "no_timeout")]
    pub job_timeout: i64,
    #[serde(default = "no_timeout")]
    pub queue_timeout: i64,
    #[serde(default = "no_timeout")]
    pub task_timeout: i64,
    #[serde(default = "one")]
    pub max_failed_nodes: u32,
    #[serde(default = "no_limit")]
    pub max_cluster_cpu: i32,
    #[serde(default = "no_limit")]
    pub max_cpu_per_host: i32,
    #[serde(default)]
    pub num_exec: u32,
    #[serde(default)]
    pub no_reschedule: bool,
    #[serde(default)]
    pub exclusive_exec: bool,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

fn no_timeout() -> i64 {
    -1
}

fn one() -> u32 {
    1
}

fn no_limit() -> i32 {
    -1
}

/// Ingestion service: allocates ids, turns descriptions into jobs, and
/// pushes them through the queue into the scheduler's view.
pub struct JobManager {
    jobs_dir: PathBuf,
    queue: Arc<JobQueue>,
    scheduler: Arc<Scheduler>,
    timeouts: Arc<dyn TimeoutSink>,
    next_job_id: AtomicI64,
    next_group_id: AtomicI64,
}

impl JobManager {
    pub fn new(
        jobs_dir: PathBuf,
        queue: Arc<JobQueue>,
        scheduler: Arc<Scheduler>,
        timeouts: Arc<dyn TimeoutSink>,
    ) -> Self {
        Self {
            jobs_dir,
            queue,
            scheduler,
            timeouts,
            next_job_id: AtomicI64::new(0),
            next_group_id: AtomicI64::new(0),
        }
    }

    /// Parse a single job description and build the (not yet queued) job.
    pub fn create_job(&self, description: &str) -> Result<Arc<Job>> {
        let descr: JobDescription = serde_json::from_str(description)
            .map_err(|e| GridError::JobDescription(e.to_string()))?;
        self.create_job_from_description(&descr)
    }

    pub fn create_job_from_description(&self, descr: &JobDescription) -> Result<Arc<Job>> {
        if descr.script.is_empty() {
            return Err(GridError::JobDescription("empty script file name".into()));
        }
        let script = self.read_script(Path::new(&descr.script))?;

        let params = JobParams {
            priority: descr.priority,
            limits: JobLimits {
                max_cluster_cpu: descr.max_cluster_cpu,
                max_cpu_per_host: descr.max_cpu_per_host,
                max_failed_nodes: descr.max_failed_nodes,
                num_exec: descr.num_exec,
            },
            timeouts: JobTimeouts {
                queue_timeout: descr.queue_timeout,
                job_timeout: descr.job_timeout,
                task_timeout: if descr.task_timeout < 0 {
                    -1
                } else {
                    descr.task_timeout
                },
            },
            no_reschedule: descr.no_reschedule,
            exclusive: descr.exclusive_exec,
            hosts: descr.hosts.iter().cloned().collect(),
            groups: descr.groups.iter().cloned().collect(),
        };

        let id = self.next_job_id.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(Job::new(id, script, &descr.language, params)))
    }

    /// Queue a single job as its own group.
    pub fn push_job(&self, job: Arc<Job>) {
        let group_id = self.next_group_id.fetch_add(1, Ordering::AcqRel);
        let job_id = job.id();
        let queue_timeout = job.timeouts().queue_timeout;

        tracing::info!(job_id, group_id, "push job");
        self.queue.push(job, group_id);
        self.scheduler.on_new_job();
        self.timeouts.push_queue_timeout(job_id, queue_timeout);
    }

    /// Queue a DAG of jobs under one group id, preserving topological order.
    pub fn push_jobs(&self, jobs: Vec<Arc<Job>>) {
        let group_id = self.next_group_id.fetch_add(1, Ordering::AcqRel);
        tracing::info!(group_id, num_jobs = jobs.len(), "push jobs");

        let timeouts: Vec<(i64, i64)> = jobs
            .iter()
            .map(|j| (j.id(), j.timeouts().queue_timeout))
            .collect();
        self.queue.push_all(jobs, group_id);
        self.scheduler.on_new_job();
        for (job_id, queue_timeout) in timeouts {
            self.timeouts.push_queue_timeout(job_id, queue_timeout);
        }
    }

    /// Parse and queue a single job description.
    pub fn submit_job(&self, description: &str) -> Result<Arc<Job>> {
        let job = self.create_job(description)?;
        self.push_job(job.clone());
        Ok(job)
    }

    /// Parse and queue a meta-job: each line of `description` names an
    /// ordered chain of job description files, `a b c` meaning a→b→c.
    pub fn submit_meta_job(&self, description: &str) -> Result<Vec<Arc<Job>>> {
        let chains = parse_meta_chains(description);
        if chains.is_empty() {
            return Err(GridError::JobDescription("empty meta-job".into()));
        }

        // job files in order of first appearance
        let mut file_to_index: HashMap<String, usize> = HashMap::new();
        let mut files: Vec<String> = Vec::new();
        for chain in &chains {
            for name in chain {
                if !file_to_index.contains_key(name) {
                    file_to_index.insert(name.clone(), files.len());
                    files.push(name.clone());
                }
            }
        }

        let mut jobs = Vec::with_capacity(files.len());
        for name in &files {
            let path = self.resolve(Path::new(name));
            let data = std::fs::read_to_string(&path).map_err(|e| {
                GridError::JobDescription(format!("couldn't open {}: {}", path.display(), e))
            })?;
            jobs.push(self.create_job(&data)?);
        }

        let index_chains: Vec<Vec<usize>> = chains
            .iter()
            .map(|chain| chain.iter().map(|name| file_to_index[name]).collect())
            .collect();

        let (_group, sorted) = build_job_group(&jobs, &index_chains)?;
        self.push_jobs(sorted.clone());
        Ok(sorted)
    }

    /// Ingest a description file: `.meta` files describe job DAGs, anything
    /// else is a single job description.
    pub fn submit_file(&self, path: &Path) -> Result<Vec<Arc<Job>>> {
        let path = self.resolve(path);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            GridError::JobDescription(format!("couldn't open {}: {}", path.display(), e))
        })?;

        if path.extension().map(|e| e == "meta").unwrap_or(false) {
            self.submit_meta_job(&data)
        } else {
            Ok(vec![self.submit_job(&data)?])
        }
    }

    /// Read a script file and base64-encode it for the wire. Trailing
    /// whitespace is trimmed per line, matching what workers expect.
    fn read_script(&self, path: &Path) -> Result<String> {
        let path = self.resolve(path);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            GridError::JobDescription(format!("couldn't open {}: {}", path.display(), e))
        })?;

        let mut normalized = String::with_capacity(data.len());
        for line in data.lines() {
            normalized.push_str(line.trim_end());
            normalized.push('\n');
        }
        Ok(BASE64.encode(normalized.as_bytes()))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.jobs_dir.join(path)
        }
    }
}
