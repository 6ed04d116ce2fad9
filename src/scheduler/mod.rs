//! The master-side scheduler: placement decisions, capacity accounting,
//! failure bookkeeping, rescheduling, and job completion.
//!
//! Two mutexes protect the shared state, workers outermost and jobs
//! innermost, never inverted. Completion callbacks, DAG release, and bus
//! notifications always run with both mutexes released.

pub mod timeout;

pub use timeout::{TimeoutHandler, TimeoutManager, TimeoutQueue, TimeoutSink};

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::event::{BusEvent, EventBus};
use crate::job::{Job, JobEvent, JobId, JobQueue, TaskId};
use crate::proto::{NODE_JOB_COMPLETION_NOT_FOUND, NODE_JOB_TIMEOUT, NODE_OK};
use crate::worker::{Worker, WorkerCommand, WorkerJob, WorkerRegistry, WorkerTask};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_TIMEOUT: &str = "timeout";
pub const STATUS_STOPPED: &str = "stopped";
pub const STATUS_MAX_FAILED_NODES: &str = "max failed nodes limit exceeded";

/// Per-job blocklist of worker addresses that failed it.
#[derive(Debug, Default)]
struct FailedWorkers {
    map: HashMap<JobId, HashSet<String>>,
}

impl FailedWorkers {
    fn add(&mut self, job_id: JobId, ip: &str) -> bool {
        self.map.entry(job_id).or_default().insert(ip.to_string())
    }

    fn contains(&self, job_id: JobId, ip: &str) -> bool {
        self.map
            .get(&job_id)
            .map(|set| set.contains(ip))
            .unwrap_or(false)
    }

    fn count(&self, job_id: JobId) -> usize {
        self.map.get(&job_id).map(|set| set.len()).unwrap_or(0)
    }

    fn delete(&mut self, job_id: JobId) {
        self.map.remove(&job_id);
    }

    fn num_failed_jobs(&self) -> usize {
        self.map.len()
    }
}

/// The scheduler's own view of one node. `busy_cpu` is authoritative for
/// placement; the worker's reported numbers never feed it.
struct NodeState {
    worker: Arc<Worker>,
    busy_cpu: u32,
    assigned: WorkerJob,
}

impl NodeState {
    fn new(worker: Arc<Worker>) -> Self {
        Self {
            worker,
            busy_cpu: 0,
            assigned: WorkerJob::new(),
        }
    }

    fn free_cpu(&self) -> u32 {
        self.worker.cpu().saturating_sub(self.busy_cpu)
    }
}

#[derive(Default)]
struct WorkerTable {
    nodes: HashMap<String, NodeState>,
    failed: FailedWorkers,
}

/// Remaining-execution bookkeeping for one active job.
struct Execution {
    remaining: i64,
    planned: u32,
    abandoned: u32,
}

#[derive(Default)]
struct JobTable {
    /// Active jobs in insertion order.
    active: Vec<Arc<Job>>,
    executions: HashMap<JobId, Execution>,
    tasks_to_send: HashMap<JobId, BTreeSet<TaskId>>,
    need_reschedule: VecDeque<WorkerTask>,
}

impl JobTable {
    fn find(&self, job_id: JobId) -> Option<&Arc<Job>> {
        self.active.iter().find(|j| j.id() == job_id)
    }
}

struct RemovedJob {
    job: Arc<Job>,
    status: String,
}

/// Deferred side effects, flushed after both mutexes are released.
#[derive(Default)]
struct Outcome {
    removals: Vec<RemovedJob>,
    tasks_notify: bool,
    commands_notify: bool,
}

pub struct Scheduler {
    queue: Arc<JobQueue>,
    registry: Arc<WorkerRegistry>,
    timeouts: Arc<dyn TimeoutSink>,
    bus: EventBus,
    workers: Mutex<WorkerTable>,
    jobs: Mutex<JobTable>,
}

impl Scheduler {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: Arc<WorkerRegistry>,
        timeouts: Arc<dyn TimeoutSink>,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            registry,
            timeouts,
            bus,
            workers: Mutex::new(WorkerTable::default()),
            jobs: Mutex::new(JobTable::default()),
        })
    }

    fn lock_workers(&self) -> MutexGuard<'_, WorkerTable> {
        self.workers.lock().unwrap()
    }

    fn lock_jobs(&self) -> MutexGuard<'_, JobTable> {
        self.jobs.lock().unwrap()
    }

    /// A worker joined (registry load or first heartbeat).
    pub fn on_host_appearance(&self, worker: Arc<Worker>) {
        {
            let mut workers = self.lock_workers();
            let ip = worker.ip().to_string();
            workers.nodes.entry(ip).or_insert_with(|| NodeState::new(worker));
        }
        self.bus.notify(BusEvent::TasksAvailable);
    }

    /// Availability transitions from the heartbeat watchdog. A worker going
    /// not-available fails every job it held; its tasks are rescheduled.
    pub fn on_changed_worker_state(&self, changed: &[Arc<Worker>]) {
        let mut out = Outcome::default();
        {
            let mut workers = self.lock_workers();
            let mut jobs = self.lock_jobs();
            let WorkerTable { nodes, failed } = &mut *workers;

            for worker in changed {
                if worker.is_available() {
                    continue;
                }
                let ip = worker.ip();
                let Some(node) = nodes.get_mut(ip) else {
                    tracing::warn!(ip, "state change for unknown worker");
                    continue;
                };
                if node.assigned.is_empty() {
                    continue;
                }

                let assignment = std::mem::take(&mut node.assigned);
                node.busy_cpu = 0;
                for job_id in assignment.job_ids() {
                    tracing::warn!(ip, job_id, "worker lost while executing job");
                    failed.add(job_id, ip);
                }
                Self::reschedule_worker_job(nodes, failed, &mut jobs, &assignment, &mut out);
            }
        }
        self.flush(out);
    }

    /// Remove every worker of a host: stop its tasks, blocklist it for the
    /// jobs it held, and reschedule its work.
    pub fn delete_worker(&self, host: &str) {
        let affected = self.registry.get_workers_by_host(host);
        let mut out = Outcome::default();
        {
            let mut workers = self.lock_workers();
            let mut jobs = self.lock_jobs();
            let WorkerTable { nodes, failed } = &mut *workers;

            for worker in &affected {
                let ip = worker.ip();
                let Some(node) = nodes.remove(ip) else { continue };
                let assignment = node.assigned;
                for task in assignment.iter() {
                    worker.push_command(crate::worker::PendingCommand::new(
                        WorkerCommand::StopTask {
                            job_id: task.job_id,
                            task_id: task.task_id,
                        },
                    ));
                    out.commands_notify = true;
                }
                for job_id in assignment.job_ids() {
                    failed.add(job_id, ip);
                }
                Self::reschedule_worker_job(nodes, failed, &mut jobs, &assignment, &mut out);
            }
        }
        for worker in &affected {
            self.registry.remove_worker(worker.ip());
            tracing::info!(host, ip = worker.ip(), "worker deleted");
        }
        self.flush(out);
    }

    /// A job landed in the queue; plan it if any node has capacity.
    pub fn on_new_job(&self) {
        if self.can_take_new_job() {
            self.plan_job_execution();
        }
    }

    fn can_take_new_job(&self) -> bool {
        let workers = self.lock_workers();
        workers
            .nodes
            .values()
            .any(|n| n.worker.is_available() && n.free_cpu() > 0)
    }

    /// Pull the next runnable job out of the queue into the in-flight set,
    /// seeding its task ids and remaining-execution counter.
    fn plan_job_execution(&self) -> bool {
        let Some(job) = self.queue.pop() else {
            return false;
        };

        let planned = Self::num_planned_exec(&job, self.registry.total_cpu());
        job.set_planned_exec(planned);
        let job_id = job.id();

        {
            let mut jobs = self.lock_jobs();
            jobs.tasks_to_send.insert(job_id, (0..planned).collect());
            jobs.executions.insert(
                job_id,
                Execution {
                    remaining: planned as i64,
                    planned,
                    abandoned: 0,
                },
            );
            jobs.active.push(job.clone());
        }

        tracing::info!(job_id, planned, "job planned");
        self.timeouts
            .push_job_timeout(job_id, job.timeouts().job_timeout);
        self.bus.notify(BusEvent::TasksAvailable);
        true
    }

    /// How many tasks to emit for a job: the explicit `num_exec`, otherwise
    /// the cluster CPU clamped by `max_cluster_cpu`, but at least one.
    fn num_planned_exec(job: &Job, total_cpu: u32) -> u32 {
        let limits = job.limits();
        if limits.num_exec > 0 {
            return limits.num_exec;
        }
        let planned = if limits.max_cluster_cpu > 0 {
            total_cpu.min(limits.max_cluster_cpu as u32)
        } else {
            total_cpu
        };
        planned.max(1)
    }

    /// The placement decision. Returns one single-job batch of tasks for one
    /// worker, already merged into the worker's assignment and accounted in
    /// its busy-CPU counter, with per-task timeouts armed.
    pub fn get_task_to_send(&self) -> Option<(WorkerJob, String, Arc<Job>)> {
        let mut any_free = false;
        let placement = {
            let mut workers = self.lock_workers();
            let mut jobs = self.lock_jobs();
            let WorkerTable { nodes, failed } = &mut *workers;

            // more free CPU first, ties broken by more memory
            let mut order: Vec<(String, u32, u64)> = nodes
                .iter()
                .map(|(ip, n)| (ip.clone(), n.free_cpu(), n.worker.memory_mb()))
                .collect();
            order.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));

            let mut found = None;
            for (ip, free, _mem) in order {
                let node = nodes.get_mut(&ip).expect("node listed");
                if free == 0 || !node.worker.is_available() {
                    continue;
                }
                any_free = true;

                let (planned, job) =
                    Self::build_assignment(failed, &mut jobs, &node.worker, &node.assigned, free);
                let Some(job) = job else { continue };
                if planned.is_empty() {
                    continue;
                }

                node.assigned.merge(&planned);
                node.busy_cpu += planned.total_tasks() as u32;
                found = Some((planned, ip, job));
                break;
            }
            found
        };

        match placement {
            Some((planned, ip, job)) => {
                let task_timeout = job.timeouts().task_timeout;
                for task in planned.iter() {
                    self.timeouts.push_task_timeout(task, &ip, task_timeout);
                }
                tracing::debug!(
                    job_id = job.id(),
                    ip,
                    num_tasks = planned.total_tasks(),
                    "tasks placed"
                );
                Some((planned, ip, job))
            }
            None => {
                // every queued job is fully dispatched; pull the next one
                if any_free {
                    self.plan_job_execution();
                }
                None
            }
        }
    }

    /// Collect tasks of exactly one job for a worker with `free` CPUs:
    /// reschedule FIFO first, then the active jobs' undispatched tasks.
    fn build_assignment(
        failed: &FailedWorkers,
        jobs: &mut JobTable,
        worker: &Worker,
        current: &WorkerJob,
        free: u32,
    ) -> (WorkerJob, Option<Arc<Job>>) {
        let mut planned = WorkerJob::new();
        let mut chosen: Option<Arc<Job>> = None;

        let mut index = 0;
        while index < jobs.need_reschedule.len() {
            if planned.total_tasks() as u32 >= free {
                break;
            }
            let task = jobs.need_reschedule[index];

            match &chosen {
                Some(job) => {
                    // one job id per assignment
                    if task.job_id != job.id() {
                        break;
                    }
                    if !Self::can_add_task(&jobs.active, current, &planned, job) {
                        break;
                    }
                    planned.add_task(task.job_id, task.task_id);
                    jobs.need_reschedule.remove(index);
                }
                None => {
                    let Some(job) = jobs.find(task.job_id).cloned() else {
                        // stale entry for a removed job
                        jobs.need_reschedule.remove(index);
                        continue;
                    };
                    if failed.contains(task.job_id, worker.ip())
                        || !job.is_host_permitted(worker.host())
                        || !job.is_group_permitted(worker.group())
                        || !Self::can_add_task(&jobs.active, current, &planned, &job)
                    {
                        index += 1;
                        continue;
                    }
                    planned.add_task(task.job_id, task.task_id);
                    jobs.need_reschedule.remove(index);
                    chosen = Some(job);
                }
            }
        }

        if (planned.total_tasks() as u32) < free {
            let JobTable {
                active,
                tasks_to_send,
                ..
            } = jobs;

            for job in active.iter() {
                if let Some(c) = &chosen {
                    if job.id() != c.id() {
                        continue;
                    }
                }
                if failed.contains(job.id(), worker.ip()) {
                    continue;
                }
                if !job.is_host_permitted(worker.host()) || !job.is_group_permitted(worker.group())
                {
                    continue;
                }
                let Some(tasks) = tasks_to_send.get_mut(&job.id()) else {
                    if chosen.is_some() {
                        break;
                    }
                    continue;
                };

                let mut contributed = false;
                while (planned.total_tasks() as u32) < free {
                    if !Self::can_add_task(active, current, &planned, job) {
                        break;
                    }
                    let Some(&task_id) = tasks.iter().next() else {
                        break;
                    };
                    tasks.remove(&task_id);
                    planned.add_task(job.id(), task_id);
                    contributed = true;
                }
                if tasks.is_empty() {
                    tasks_to_send.remove(&job.id());
                }

                if contributed {
                    chosen.get_or_insert_with(|| job.clone());
                    break;
                }
                if chosen.is_some() {
                    break;
                }
            }
        }

        (planned, chosen)
    }

    /// Per-worker admission: exclusivity both ways, then the per-host cap.
    fn can_add_task(
        active: &[Arc<Job>],
        current: &WorkerJob,
        planned: &WorkerJob,
        job: &Arc<Job>,
    ) -> bool {
        if job.exclusive() && current.job_ids().any(|id| id != job.id()) {
            return false;
        }
        // an exclusive job already on the worker blocks everything else
        let holds_other_exclusive = current.job_ids().any(|id| {
            id != job.id()
                && active
                    .iter()
                    .any(|j| j.id() == id && j.exclusive())
        });
        if holds_other_exclusive {
            return false;
        }

        let max_per_host = job.limits().max_cpu_per_host;
        if max_per_host >= 0 {
            let held = current.num_tasks(job.id()) + planned.num_tasks(job.id());
            if held >= max_per_host as usize {
                return false;
            }
        }
        true
    }

    /// Transport outcome for one dispatched batch. Success needs no action;
    /// failure blocklists the worker for the batch's job and reissues the
    /// batch elsewhere.
    pub fn on_task_send_completion(&self, success: bool, assignment: &WorkerJob, host_ip: &str) {
        if success {
            return;
        }

        let mut out = Outcome::default();
        {
            let mut workers = self.lock_workers();
            let mut jobs = self.lock_jobs();
            let WorkerTable { nodes, failed } = &mut *workers;

            for job_id in assignment.job_ids() {
                tracing::warn!(job_id, ip = host_ip, "task batch send failed");
                failed.add(job_id, host_ip);
            }
            if let Some(node) = nodes.get_mut(host_ip) {
                for task in assignment.iter() {
                    if node.assigned.delete_task(task.job_id, task.task_id) {
                        node.busy_cpu = node.busy_cpu.saturating_sub(1);
                    }
                }
            }
            Self::reschedule_worker_job(nodes, failed, &mut jobs, assignment, &mut out);
        }
        out.tasks_notify = true;
        self.flush(out);
    }

    /// A worker reported a task result.
    ///
    /// Success is idempotent: a task no longer held by the worker (duplicate
    /// report, or one already timed out) changes nothing. Any error except
    /// `NODE_JOB_COMPLETION_NOT_FOUND` fails the worker for the job and
    /// reschedules everything the worker held.
    pub fn on_task_completion(
        &self,
        err_code: i32,
        exec_time_ms: i64,
        task: WorkerTask,
        host_ip: &str,
    ) {
        if err_code == NODE_JOB_COMPLETION_NOT_FOUND {
            return;
        }

        let mut out = Outcome::default();
        if err_code == NODE_OK {
            {
                let mut workers = self.lock_workers();
                let mut jobs = self.lock_jobs();
                let WorkerTable { nodes, failed } = &mut *workers;

                let Some(node) = nodes.get_mut(host_ip) else {
                    return;
                };
                if !node.assigned.delete_task(task.job_id, task.task_id) {
                    // duplicate completion
                    return;
                }
                node.busy_cpu = node.busy_cpu.saturating_sub(1);
                tracing::debug!(
                    job_id = task.job_id,
                    task_id = task.task_id,
                    ip = host_ip,
                    exec_time_ms,
                    "task completed"
                );
                Self::decrement_execution(&mut jobs, failed, task.job_id, 1, 0, &mut out);
            }
            out.tasks_notify = true;
        } else {
            {
                let mut workers = self.lock_workers();
                let mut jobs = self.lock_jobs();
                let WorkerTable { nodes, failed } = &mut *workers;

                let Some(node) = nodes.get_mut(host_ip) else {
                    return;
                };
                tracing::warn!(
                    err_code,
                    job_id = task.job_id,
                    task_id = task.task_id,
                    ip = host_ip,
                    "task failed on worker"
                );

                // the whole assignment is rescheduled, so the worker is
                // failed for every job it held, not just the erroring one
                let assignment = std::mem::take(&mut node.assigned);
                node.busy_cpu = 0;
                for job_id in assignment.job_ids() {
                    failed.add(job_id, host_ip);
                }
                Self::reschedule_worker_job(nodes, failed, &mut jobs, &assignment, &mut out);
            }
            out.tasks_notify = true;
        }
        self.flush(out);
    }

    /// A dispatched task exceeded its timeout. If the worker still holds it,
    /// tell the worker to kill it and account it as a timed-out completion.
    pub fn on_task_timeout(&self, task: WorkerTask, host_ip: &str) {
        let still_held = {
            let workers = self.lock_workers();
            workers
                .nodes
                .get(host_ip)
                .map(|n| n.assigned.has_task(task.job_id, task.task_id))
                .unwrap_or(false)
        };
        if !still_held {
            return;
        }

        tracing::warn!(
            job_id = task.job_id,
            task_id = task.task_id,
            ip = host_ip,
            "task timeout"
        );
        if self.registry.push_command(
            host_ip,
            WorkerCommand::StopTask {
                job_id: task.job_id,
                task_id: task.task_id,
            },
        ) {
            self.bus.notify(BusEvent::CommandsAvailable);
        }
        self.on_task_completion(NODE_JOB_TIMEOUT, 0, task, host_ip);
    }

    /// Abort an active job on its job/queue deadline.
    pub fn on_job_timeout(&self, job_id: JobId) {
        self.abort_job(job_id, STATUS_TIMEOUT);
    }

    /// Admin stop: deletes the job from the queue if it's still waiting,
    /// otherwise aborts the active job.
    pub fn stop_job(&self, job_id: JobId) -> bool {
        if self.queue.delete(job_id) {
            self.bus.notify(BusEvent::TasksAvailable);
            return true;
        }
        self.abort_job(job_id, STATUS_STOPPED)
    }

    /// Stop every job of a group, queued or active.
    pub fn stop_job_group(&self, group_id: i64) {
        self.queue.delete_group(group_id);
        let ids: Vec<JobId> = {
            let jobs = self.lock_jobs();
            jobs.active
                .iter()
                .filter(|j| j.group_id() == group_id)
                .map(|j| j.id())
                .collect()
        };
        for job_id in ids {
            self.abort_job(job_id, STATUS_STOPPED);
        }
    }

    /// Stop everything: queued jobs, active jobs, and a stop-all broadcast
    /// to the whole fleet.
    pub fn stop_all_jobs(&self) {
        for job_id in self.queue.job_ids() {
            self.queue.delete(job_id);
        }
        let ids: Vec<JobId> = {
            let jobs = self.lock_jobs();
            jobs.active.iter().map(|j| j.id()).collect()
        };
        for job_id in ids {
            self.abort_job(job_id, STATUS_STOPPED);
        }
        self.registry.broadcast_command(WorkerCommand::StopAllJobs);
        self.bus.notify(BusEvent::CommandsAvailable);
    }

    /// Tell the fleet to drop work left over from a previous master
    /// incarnation. No local state changes.
    pub fn stop_previous_jobs(&self) {
        self.registry
            .broadcast_command(WorkerCommand::StopPreviousJobs);
        self.bus.notify(BusEvent::CommandsAvailable);
    }

    fn abort_job(&self, job_id: JobId, status: &str) -> bool {
        let mut out = Outcome::default();
        let found = {
            let mut workers = self.lock_workers();
            let mut jobs = self.lock_jobs();
            let WorkerTable { nodes, failed } = &mut *workers;

            if jobs.find(job_id).is_none() {
                false
            } else {
                Self::stop_workers_holding(nodes, job_id, &mut out);
                Self::remove_job(&mut jobs, failed, job_id, status, &mut out);
                true
            }
        };
        out.tasks_notify = found;
        self.flush(out);
        found
    }

    /// Reschedule policy for a batch of tasks whose worker failed them.
    /// Per job: abort at the failed-node limit, abandon for no-reschedule
    /// jobs, otherwise append to the FIFO.
    fn reschedule_worker_job(
        nodes: &mut HashMap<String, NodeState>,
        failed: &mut FailedWorkers,
        jobs: &mut JobTable,
        assignment: &WorkerJob,
        out: &mut Outcome,
    ) {
        for job_id in assignment.job_ids() {
            let Some(job) = jobs.find(job_id).cloned() else {
                tracing::info!(job_id, "reschedule skipped, job no longer active");
                continue;
            };
            let tasks = assignment.tasks_of(job_id).expect("job listed").clone();

            if failed.count(job_id) >= job.limits().max_failed_nodes as usize {
                Self::stop_workers_holding(nodes, job_id, out);
                Self::remove_job(jobs, failed, job_id, STATUS_MAX_FAILED_NODES, out);
                continue;
            }

            if job.no_reschedule() {
                Self::decrement_execution(jobs, failed, job_id, tasks.len() as i64, tasks.len() as u32, out);
                continue;
            }

            for task_id in tasks {
                jobs.need_reschedule.push_back(WorkerTask { job_id, task_id });
            }
            out.tasks_notify = true;
        }
    }

    /// Count successful (or abandoned) executions; at zero remaining the job
    /// is done. A job that abandoned tasks doesn't get to claim success.
    fn decrement_execution(
        jobs: &mut JobTable,
        failed: &mut FailedWorkers,
        job_id: JobId,
        num_tasks: i64,
        abandoned: u32,
        out: &mut Outcome,
    ) {
        let Some(exec) = jobs.executions.get_mut(&job_id) else {
            return;
        };
        exec.remaining -= num_tasks;
        exec.abandoned += abandoned;

        if exec.remaining < 1 {
            let status = if exec.abandoned > 0 {
                format!("failed ({} tasks abandoned)", exec.abandoned)
            } else {
                STATUS_SUCCESS.to_string()
            };
            Self::remove_job(jobs, failed, job_id, &status, out);
        }
    }

    /// Drop a job from every scheduler structure. The callback and DAG
    /// release are deferred to `flush`.
    fn remove_job(
        jobs: &mut JobTable,
        failed: &mut FailedWorkers,
        job_id: JobId,
        status: &str,
        out: &mut Outcome,
    ) {
        failed.delete(job_id);
        jobs.executions.remove(&job_id);
        jobs.tasks_to_send.remove(&job_id);
        jobs.need_reschedule.retain(|t| t.job_id != job_id);

        match jobs.active.iter().position(|j| j.id() == job_id) {
            Some(index) => {
                let job = jobs.active.remove(index);
                out.removals.push(RemovedJob {
                    job,
                    status: status.to_string(),
                });
            }
            None => tracing::warn!(job_id, "remove: job not found"),
        }
    }

    /// Stop every node's tasks of one job: a stop command per task, capacity
    /// returned, assignment cleared.
    fn stop_workers_holding(
        nodes: &mut HashMap<String, NodeState>,
        job_id: JobId,
        out: &mut Outcome,
    ) {
        for node in nodes.values_mut() {
            let Some(tasks) = node.assigned.delete_job(job_id) else {
                continue;
            };
            node.busy_cpu = node.busy_cpu.saturating_sub(tasks.len() as u32);
            for task_id in tasks {
                node.worker
                    .push_command(crate::worker::PendingCommand::new(
                        WorkerCommand::StopTask { job_id, task_id },
                    ));
            }
            out.commands_notify = true;
        }
    }

    /// Run deferred callbacks and notifications. Never called under a lock.
    fn flush(&self, out: Outcome) {
        for removed in &out.removals {
            let job_id = removed.job.id();
            let message = format!(
                "================\nJob completed, jobId = {}\ncompletion status: {}\n================",
                job_id, removed.status
            );
            tracing::info!(job_id, status = %removed.status, "job removed");
            removed.job.run_callback(&JobEvent::Completed {
                job_id,
                status: removed.status.clone(),
                message,
            });
            // only success unblocks DAG dependents; a timed-out, aborted, or
            // failed predecessor keeps its successors gated (admin deletion
            // releases them through the queue's delete path instead)
            if removed.status == STATUS_SUCCESS {
                removed.job.release_group();
            }
        }
        if out.tasks_notify || !out.removals.is_empty() {
            self.bus.notify(BusEvent::TasksAvailable);
        }
        if out.commands_notify {
            self.bus.notify(BusEvent::CommandsAvailable);
        }
    }

    /// Human-readable report for one active job (admin `info`).
    pub fn job_info(&self, job_id: JobId) -> String {
        let workers = self.lock_workers();
        let jobs = self.lock_jobs();

        let Some(job) = jobs.find(job_id) else {
            return format!("job isn't executing now, jobId = {}", job_id);
        };

        let mut report = format!(
            "================\nJob info, jobId = {}\nsubmitted at = {}\n",
            job_id,
            job.created_at().to_rfc3339()
        );
        if let Some(exec) = jobs.executions.get(&job_id) {
            report.push_str(&format!(
                "job executions = {}\ntotal planned executions = {}\n",
                exec.planned as i64 - exec.remaining,
                job.planned_exec()
            ));
        }

        let busy_workers = workers
            .nodes
            .values()
            .filter(|n| n.assigned.has_job(job_id))
            .count();
        let busy_cpus: usize = workers
            .nodes
            .values()
            .map(|n| n.assigned.num_tasks(job_id))
            .sum();
        report.push_str(&format!(
            "busy workers = {}\nbusy cpu's = {}\n================",
            busy_workers, busy_cpus
        ));
        report
    }

    /// Fleet-wide counters (admin `stat`).
    pub fn statistics(&self) -> String {
        let workers = self.lock_workers();
        let jobs = self.lock_jobs();

        let busy_workers = workers.nodes.values().filter(|n| n.busy_cpu > 0).count();
        let free_workers = workers.nodes.len() - busy_workers;
        let busy_cpu: u32 = workers.nodes.values().map(|n| n.busy_cpu).sum();

        let executing: Vec<String> = jobs.active.iter().map(|j| j.id().to_string()).collect();

        format!(
            "================\nbusy workers = {}\nfree workers = {}\nfailed jobs = {}\nbusy cpu's = {}\njobs = {}\nneed reschedule = {}\nexecuting jobs: {{{}}}\n================",
            busy_workers,
            free_workers,
            workers.failed.num_failed_jobs(),
            busy_cpu,
            jobs.active.len(),
            jobs.need_reschedule.len(),
            executing.join(", ")
        )
    }

    /// Test/diagnostic hooks: scheduler-view counters for one node.
    pub fn node_snapshot(&self, ip: &str) -> Option<(u32, WorkerJob)> {
        let workers = self.lock_workers();
        workers
            .nodes
            .get(ip)
            .map(|n| (n.busy_cpu, n.assigned.clone()))
    }

    pub fn num_active_jobs(&self) -> usize {
        self.lock_jobs().active.len()
    }

    pub fn num_need_reschedule(&self) -> usize {
        self.lock_jobs().need_reschedule.len()
    }

    pub fn num_tasks_to_send(&self, job_id: JobId) -> usize {
        self.lock_jobs()
            .tasks_to_send
            .get(&job_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}
