//! Job model: a script plus the parameters controlling how many times and
//! where it runs, and the DAG groups tying jobs together with precedence
//! edges.

pub mod ingest;
pub mod queue;

pub use ingest::{JobDescription, JobManager};
pub use queue::JobQueue;

use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use chrono::{DateTime, Utc};

use crate::error::{GridError, Result};

pub type JobId = i64;
pub type GroupId = i64;
pub type TaskId = u32;

/// Terminal job notifications delivered to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Completed {
        job_id: JobId,
        status: String,
        message: String,
    },
    Deleted {
        job_id: JobId,
        message: String,
    },
}

pub type JobCallback = Box<dyn Fn(&JobEvent) + Send + Sync>;

/// Placement limits. Zero or negative values mean "no limit" except for
/// `num_exec`, where zero means "derive from cluster CPU".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLimits {
    pub max_cluster_cpu: i32,
    pub max_cpu_per_host: i32,
    pub max_failed_nodes: u32,
    pub num_exec: u32,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            max_cluster_cpu: -1,
            max_cpu_per_host: -1,
            max_failed_nodes: 1,
            num_exec: 0,
        }
    }
}

/// Seconds; -1 disables the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeouts {
    pub queue_timeout: i64,
    pub job_timeout: i64,
    pub task_timeout: i64,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            queue_timeout: -1,
            job_timeout: -1,
            task_timeout: -1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobParams {
    pub priority: i32,
    pub limits: JobLimits,
    pub timeouts: JobTimeouts,
    pub no_reschedule: bool,
    pub exclusive: bool,
    /// Empty set permits every host.
    pub hosts: HashSet<String>,
    /// Empty set permits every group.
    pub groups: HashSet<String>,
}

struct DagHandle {
    group: Arc<JobGroup>,
    vertex: usize,
}

pub struct Job {
    id: JobId,
    group_id: AtomicI64,
    priority: i32,
    script: String,
    language: String,
    limits: JobLimits,
    timeouts: JobTimeouts,
    no_reschedule: bool,
    exclusive: bool,
    hosts: HashSet<String>,
    groups: HashSet<String>,

    created_at: DateTime<Utc>,
    planned_exec: AtomicU32,
    depends: AtomicI32,
    dag: OnceLock<DagHandle>,
    callback: Mutex<Option<JobCallback>>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("group_id", &self.group_id.load(Ordering::Relaxed))
            .field("priority", &self.priority)
            .field("language", &self.language)
            .field("num_depends", &self.depends.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Job {
    /// `script` is the base64-encoded script payload; it is immutable once
    /// the job is enqueued.
    pub fn new(id: JobId, script: String, language: &str, params: JobParams) -> Self {
        Self {
            id,
            group_id: AtomicI64::new(0),
            priority: params.priority,
            script,
            language: language.to_string(),
            limits: params.limits,
            timeouts: params.timeouts,
            no_reschedule: params.no_reschedule,
            exclusive: params.exclusive,
            hosts: params.hosts,
            groups: params.groups,
            created_at: Utc::now(),
            planned_exec: AtomicU32::new(0),
            depends: AtomicI32::new(0),
            dag: OnceLock::new(),
            callback: Mutex::new(None),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_group_id(&self, group_id: GroupId) {
        self.group_id.store(group_id, Ordering::Release);
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn limits(&self) -> &JobLimits {
        &self.limits
    }

    pub fn timeouts(&self) -> &JobTimeouts {
        &self.timeouts
    }

    pub fn no_reschedule(&self) -> bool {
        self.no_reschedule
    }

    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn planned_exec(&self) -> u32 {
        self.planned_exec.load(Ordering::Acquire)
    }

    pub(crate) fn set_planned_exec(&self, num: u32) {
        self.planned_exec.store(num, Ordering::Release);
    }

    pub fn num_depends(&self) -> i32 {
        self.depends.load(Ordering::Acquire)
    }

    fn set_num_depends(&self, num: i32) {
        self.depends.store(num, Ordering::Release);
    }

    fn decrement_depends(&self) {
        self.depends.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn is_host_permitted(&self, host: &str) -> bool {
        self.hosts.is_empty() || self.hosts.contains(host)
    }

    pub fn is_group_permitted(&self, group: &str) -> bool {
        self.groups.is_empty() || self.groups.contains(group)
    }

    pub fn set_callback(&self, callback: JobCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    pub fn run_callback(&self, event: &JobEvent) {
        let guard = self.callback.lock().unwrap();
        if let Some(cb) = guard.as_ref() {
            cb(event);
        }
    }

    /// Decrement the in-degree of every DAG successor. Called exactly once,
    /// when this job leaves the system.
    pub fn release_group(&self) {
        if let Some(handle) = self.dag.get() {
            handle.group.on_job_completion(handle.vertex);
        }
    }
}

/// A directed acyclic graph over jobs: adjacency lists plus the per-job
/// in-degree counters the queue consults.
pub struct JobGroup {
    adjacency: Vec<Vec<usize>>,
    jobs: Mutex<Vec<Weak<Job>>>,
}

impl JobGroup {
    fn on_job_completion(&self, vertex: usize) {
        let jobs = self.jobs.lock().unwrap();
        for &succ in &self.adjacency[vertex] {
            if let Some(job) = jobs[succ].upgrade() {
                job.decrement_depends();
            }
        }
    }
}

/// Link `jobs` with the precedence `chains` (each chain `[a, b, c]` adds the
/// edges a→b and b→c, indices into `jobs`). Rejects cyclic graphs. Returns
/// the group and the jobs in topological order, in-degrees seeded.
pub fn build_job_group(
    jobs: &[Arc<Job>],
    chains: &[Vec<usize>],
) -> Result<(Arc<JobGroup>, Vec<Arc<Job>>)> {
    let n = jobs.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0i32; n];

    for chain in chains {
        for pair in chain.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if from >= n || to >= n {
                return Err(GridError::JobDescription(format!(
                    "chain references job index out of range: {} -> {}",
                    from, to
                )));
            }
            adjacency[from].push(to);
            in_degree[to] += 1;
        }
    }

    if has_cycle(&adjacency) {
        return Err(GridError::CyclicJobGraph);
    }

    let order = topological_order(&adjacency, &in_degree);

    let group = Arc::new(JobGroup {
        adjacency,
        jobs: Mutex::new(jobs.iter().map(Arc::downgrade).collect()),
    });

    let mut sorted = Vec::with_capacity(n);
    for vertex in order {
        let job = jobs[vertex].clone();
        job.set_num_depends(in_degree[vertex]);
        let _ = job.dag.set(DagHandle {
            group: group.clone(),
            vertex,
        });
        sorted.push(job);
    }
    Ok((group, sorted))
}

/// Iterative DFS looking for a back-edge.
fn has_cycle(adjacency: &[Vec<usize>]) -> bool {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    let n = adjacency.len();
    let mut color = vec![WHITE; n];

    for root in 0..n {
        if color[root] != WHITE {
            continue;
        }
        // stack of (vertex, next out-edge index)
        let mut stack = vec![(root, 0usize)];
        color[root] = GRAY;
        while let Some(&(v, next)) = stack.last() {
            if next < adjacency[v].len() {
                stack.last_mut().expect("non-empty stack").1 += 1;
                let succ = adjacency[v][next];
                match color[succ] {
                    GRAY => return true,
                    WHITE => {
                        color[succ] = GRAY;
                        stack.push((succ, 0));
                    }
                    _ => {}
                }
            } else {
                color[v] = BLACK;
                stack.pop();
            }
        }
    }
    false
}

/// Kahn's algorithm. `in_degree` is copied, not mutated.
fn topological_order(adjacency: &[Vec<usize>], in_degree: &[i32]) -> Vec<usize> {
    let mut degree = in_degree.to_vec();
    let mut ready: Vec<usize> = (0..degree.len()).filter(|&v| degree[v] == 0).collect();
    let mut order = Vec::with_capacity(degree.len());

    while let Some(v) = ready.pop() {
        order.push(v);
        for &succ in &adjacency[v] {
            degree[succ] -= 1;
            if degree[succ] == 0 {
                ready.push(succ);
            }
        }
    }
    order
}

/// Parse meta-job chain lines: each non-empty line names an ordered chain of
/// job files, `a b c` meaning a→b→c. Lines with a single name contribute an
/// isolated vertex.
pub fn parse_meta_chains(description: &str) -> Vec<Vec<String>> {
    description
        .lines()
        .map(|line| {
            line.split_whitespace()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        })
        .filter(|chain| !chain.is_empty())
        .collect()
}
