//! Worker fleet model: per-node identity, capacity, availability, the set
//! of tasks a node currently holds, and the registry the heartbeat path
//! drives.
//!
//! Availability is heartbeat-driven: any valid heartbeat makes a worker
//! available; `heartbeat_max_droped` consecutive silent check intervals
//! make it not-available. Capacity advertised in heartbeats overrides the
//! hosts-file seed.

pub mod command;

pub use command::{PendingCommand, RetryPolicy, WorkerCommand};

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::HostEntry;
use crate::job::{JobId, TaskId};
use crate::proto::Heartbeat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Availability {
    NotAvail = 0,
    Available = 1,
    Failed = 2,
}

impl Availability {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Availability::Available,
            2 => Availability::Failed,
            _ => Availability::NotAvail,
        }
    }
}

/// One task of one job, as assigned to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerTask {
    pub job_id: JobId,
    pub task_id: TaskId,
}

impl WorkerTask {
    pub fn new(job_id: JobId, task_id: TaskId) -> Self {
        Self { job_id, task_id }
    }
}

/// The tasks currently assigned to one worker, grouped by job.
///
/// No (jobId, taskId) pair appears twice; the scheduler's busy-CPU counter
/// for the node always equals `total_tasks()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerJob {
    tasks: BTreeMap<JobId, BTreeSet<TaskId>>,
}

impl WorkerJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false on a duplicate.
    pub fn add_task(&mut self, job_id: JobId, task_id: TaskId) -> bool {
        self.tasks.entry(job_id).or_default().insert(task_id)
    }

    /// Returns false if the task wasn't held.
    pub fn delete_task(&mut self, job_id: JobId, task_id: TaskId) -> bool {
        match self.tasks.get_mut(&job_id) {
            Some(set) => {
                let removed = set.remove(&task_id);
                if set.is_empty() {
                    self.tasks.remove(&job_id);
                }
                removed
            }
            None => false,
        }
    }

    /// Drop every task of a job; returns the removed task ids.
    pub fn delete_job(&mut self, job_id: JobId) -> Option<BTreeSet<TaskId>> {
        self.tasks.remove(&job_id)
    }

    pub fn has_task(&self, job_id: JobId, task_id: TaskId) -> bool {
        self.tasks
            .get(&job_id)
            .map(|set| set.contains(&task_id))
            .unwrap_or(false)
    }

    pub fn has_job(&self, job_id: JobId) -> bool {
        self.tasks.contains_key(&job_id)
    }

    pub fn job_ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.tasks.keys().copied()
    }

    pub fn tasks_of(&self, job_id: JobId) -> Option<&BTreeSet<TaskId>> {
        self.tasks.get(&job_id)
    }

    pub fn num_tasks(&self, job_id: JobId) -> usize {
        self.tasks.get(&job_id).map(|set| set.len()).unwrap_or(0)
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks.values().map(|set| set.len()).sum()
    }

    pub fn num_jobs(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn merge(&mut self, other: &WorkerJob) {
        for (job_id, tasks) in &other.tasks {
            let entry = self.tasks.entry(*job_id).or_default();
            entry.extend(tasks.iter().copied());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = WorkerTask> + '_ {
        self.tasks.iter().flat_map(|(&job_id, tasks)| {
            tasks
                .iter()
                .map(move |&task_id| WorkerTask { job_id, task_id })
        })
    }
}

/// A known worker node. Liveness fields are atomics so the heartbeat path
/// never contends with the scheduler's placement locks.
pub struct Worker {
    ip: String,
    host: String,
    group: String,
    cpu: AtomicU32,
    memory_mb: AtomicU64,
    state: AtomicU8,
    missed_heartbeats: AtomicU32,
    commands: Mutex<VecDeque<PendingCommand>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("ip", &self.ip)
            .field("host", &self.host)
            .field("group", &self.group)
            .field("cpu", &self.cpu.load(Ordering::Relaxed))
            .field("state", &self.availability())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// `ip` is the node address the transports use; the inventory seeds it
    /// with the host name until resolution happens outside the core.
    pub fn from_entry(entry: &HostEntry) -> Self {
        Self {
            ip: entry.host.clone(),
            host: entry.host.clone(),
            group: entry.group.clone(),
            cpu: AtomicU32::new(entry.cpu),
            memory_mb: AtomicU64::new(entry.memory_mb),
            state: AtomicU8::new(Availability::NotAvail as u8),
            missed_heartbeats: AtomicU32::new(0),
            commands: Mutex::new(VecDeque::new()),
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn cpu(&self) -> u32 {
        self.cpu.load(Ordering::Acquire)
    }

    pub fn memory_mb(&self) -> u64 {
        self.memory_mb.load(Ordering::Acquire)
    }

    pub fn availability(&self) -> Availability {
        Availability::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_available(&self) -> bool {
        self.availability() == Availability::Available
    }

    pub fn set_availability(&self, state: Availability) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Apply a heartbeat. Returns true if the worker just became available.
    pub fn on_heartbeat(&self, hb: &Heartbeat) -> bool {
        self.cpu.store(hb.num_cpu, Ordering::Release);
        self.memory_mb.store(hb.memory_size_mb, Ordering::Release);
        self.missed_heartbeats.store(0, Ordering::Release);

        let prev = self
            .state
            .swap(Availability::Available as u8, Ordering::AcqRel);
        Availability::from_u8(prev) != Availability::Available
    }

    /// Count a silent check interval. Returns true if the worker just
    /// crossed `max_dropped` and became not-available.
    pub fn note_missed_heartbeat(&self, max_dropped: u32) -> bool {
        if !self.is_available() {
            return false;
        }
        let missed = self.missed_heartbeats.fetch_add(1, Ordering::AcqRel) + 1;
        if missed >= max_dropped {
            self.set_availability(Availability::NotAvail);
            return true;
        }
        false
    }

    pub fn push_command(&self, command: PendingCommand) {
        self.commands.lock().unwrap().push_back(command);
    }

    pub fn pop_command(&self) -> Option<PendingCommand> {
        self.commands.lock().unwrap().pop_front()
    }

    pub fn num_pending_commands(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

/// The fleet registry: every worker the master knows, keyed by node
/// address.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Arc<Worker>>>,
    heartbeat_max_dropped: u32,
}

impl WorkerRegistry {
    pub fn new(heartbeat_max_dropped: u32) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            heartbeat_max_dropped,
        }
    }

    /// Seed the fleet from the hosts inventory.
    pub fn load(&self, entries: &[HostEntry]) {
        let mut workers = self.workers.write().unwrap();
        for entry in entries {
            let worker = Arc::new(Worker::from_entry(entry));
            workers.insert(worker.ip().to_string(), worker);
        }
        tracing::info!(num_workers = workers.len(), "worker registry loaded");
    }

    pub fn add_worker(&self, entry: &HostEntry) -> Arc<Worker> {
        let worker = Arc::new(Worker::from_entry(entry));
        self.workers
            .write()
            .unwrap()
            .insert(worker.ip().to_string(), worker.clone());
        worker
    }

    pub fn remove_worker(&self, ip: &str) -> Option<Arc<Worker>> {
        self.workers.write().unwrap().remove(ip)
    }

    pub fn get_worker_by_ip(&self, ip: &str) -> Option<Arc<Worker>> {
        self.workers.read().unwrap().get(ip).cloned()
    }

    /// Workers matching a host name (admin delete path addresses by host).
    pub fn get_workers_by_host(&self, host: &str) -> Vec<Arc<Worker>> {
        self.workers
            .read()
            .unwrap()
            .values()
            .filter(|w| w.host() == host)
            .cloned()
            .collect()
    }

    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.workers.read().unwrap().values().cloned().collect()
    }

    /// Total CPU across available workers.
    pub fn total_cpu(&self) -> u32 {
        self.workers
            .read()
            .unwrap()
            .values()
            .filter(|w| w.is_available())
            .map(|w| w.cpu())
            .sum()
    }

    /// Apply a heartbeat from `ip`. Returns the worker if it just became
    /// available (the caller re-announces it to the scheduler).
    pub fn on_heartbeat(&self, ip: &str, hb: &Heartbeat) -> Option<Arc<Worker>> {
        let worker = self.get_worker_by_ip(ip)?;
        if worker.on_heartbeat(hb) {
            tracing::info!(ip, host = hb.host, "worker available");
            Some(worker)
        } else {
            None
        }
    }

    /// One watchdog tick: count a missed interval for every available
    /// worker, returning those that just went not-available.
    pub fn check_heartbeats(&self) -> Vec<Arc<Worker>> {
        let workers = self.workers.read().unwrap();
        let mut dropped = Vec::new();
        for worker in workers.values() {
            if worker.note_missed_heartbeat(self.heartbeat_max_dropped) {
                tracing::warn!(ip = worker.ip(), "worker lost: heartbeats dropped");
                dropped.push(worker.clone());
            }
        }
        dropped
    }

    /// Enqueue a control command for one worker.
    pub fn push_command(&self, ip: &str, command: WorkerCommand) -> bool {
        match self.get_worker_by_ip(ip) {
            Some(worker) => {
                worker.push_command(PendingCommand::new(command));
                true
            }
            None => false,
        }
    }

    /// Re-enqueue a command that failed to send, keeping its attempt count.
    pub fn requeue_command(&self, ip: &str, command: PendingCommand) -> bool {
        match self.get_worker_by_ip(ip) {
            Some(worker) => {
                worker.push_command(command);
                true
            }
            None => false,
        }
    }

    /// Pop the next pending command across the fleet, FIFO per worker.
    pub fn pop_command(&self) -> Option<(PendingCommand, String)> {
        let workers = self.workers.read().unwrap();
        for worker in workers.values() {
            if let Some(command) = worker.pop_command() {
                return Some((command, worker.ip().to_string()));
            }
        }
        None
    }

    /// Broadcast a command to every known worker.
    pub fn broadcast_command(&self, command: WorkerCommand) {
        let workers = self.workers.read().unwrap();
        for worker in workers.values() {
            worker.push_command(PendingCommand::new(command.clone()));
        }
    }
}
