//! Master context: owns the services, runs the sender loops, and adapts
//! wire events into scheduler operations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{HostEntry, MasterConfig};
use crate::error::Result;
use crate::event::{BusEvent, EventBus};
use crate::job::{JobId, JobManager, JobQueue};
use crate::proto::{self, Message};
use crate::scheduler::{Scheduler, TimeoutHandler, TimeoutManager, TimeoutQueue, TimeoutSink};
use crate::worker::{PendingCommand, RetryPolicy, WorkerJob, WorkerRegistry, WorkerTask};

/// Task dispatch and result retrieval RPC. The socket plumbing lives
/// outside the core; tests plug in mocks.
#[async_trait]
pub trait ExecTransport: Send + Sync {
    /// Deliver an exec batch to a worker.
    async fn send_exec(&self, host_ip: &str, exec: proto::ExecScript) -> Result<()>;

    /// Fetch the result of one task from a worker.
    async fn get_result(
        &self,
        host_ip: &str,
        request: proto::GetResult,
    ) -> Result<proto::JobResult>;
}

/// Control-command RPC. Returns the worker's reported error code.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send_command(&self, host_ip: &str, message: Message) -> Result<i32>;
}

pub struct Master {
    config: MasterConfig,
    master_id: String,
    bus: EventBus,
    queue: Arc<JobQueue>,
    registry: Arc<WorkerRegistry>,
    scheduler: Arc<Scheduler>,
    job_manager: JobManager,
    timeouts: Arc<dyn TimeoutSink>,
    timeout_queue: Mutex<Option<TimeoutQueue>>,
    exec_transport: Arc<dyn ExecTransport>,
    command_transport: Arc<dyn CommandTransport>,
    send_slots: Arc<Semaphore>,
    result_slots: Arc<Semaphore>,
}

impl Master {
    pub fn new(
        config: MasterConfig,
        jobs_dir: PathBuf,
        exec_transport: Arc<dyn ExecTransport>,
        command_transport: Arc<dyn CommandTransport>,
    ) -> Arc<Self> {
        let bus = EventBus::new();
        let queue = Arc::new(JobQueue::new());
        let registry = Arc::new(WorkerRegistry::new(config.heartbeat_max_droped));
        let (timeouts, timeout_queue) = TimeoutManager::new();
        let scheduler = Scheduler::new(
            queue.clone(),
            registry.clone(),
            timeouts.clone() as Arc<dyn TimeoutSink>,
            bus.clone(),
        );
        let timeouts: Arc<dyn TimeoutSink> = timeouts;
        let job_manager = JobManager::new(
            jobs_dir,
            queue.clone(),
            scheduler.clone(),
            timeouts.clone(),
        );

        Arc::new(Self {
            send_slots: Arc::new(Semaphore::new(config.max_simult_sending_jobs)),
            result_slots: Arc::new(Semaphore::new(config.max_simult_result_getters)),
            master_id: Uuid::new_v4().to_string(),
            config,
            bus,
            queue,
            registry,
            scheduler,
            job_manager,
            timeouts,
            timeout_queue: Mutex::new(Some(timeout_queue)),
            exec_transport,
            command_transport,
        })
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn master_id(&self) -> &str {
        &self.master_id
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.job_manager
    }

    /// Seed the fleet and register every node with the scheduler.
    pub fn load_hosts(&self, entries: &[HostEntry]) {
        self.registry.load(entries);
        for worker in self.registry.workers() {
            self.scheduler.on_host_appearance(worker);
        }
    }

    /// Spawn the service loops. Returns once they are running; they stop
    /// when `shutdown` fires.
    pub async fn start(self: &Arc<Self>, shutdown: CancellationToken) {
        let timeout_queue = self
            .timeout_queue
            .lock()
            .await
            .take()
            .expect("master started twice");
        let handler: Arc<dyn TimeoutHandler> = self.clone();
        tokio::spawn(timeout_queue.run(handler, shutdown.clone()));

        for _ in 0..self.config.num_job_send_thread.max(1) {
            tokio::spawn(self.clone().job_sender_loop(shutdown.clone()));
        }
        tokio::spawn(self.clone().command_sender_loop(shutdown.clone()));
        tokio::spawn(self.clone().heartbeat_watchdog(shutdown.clone()));
    }

    /// Waits on the bus, then drains every placement the scheduler offers,
    /// dispatching each batch under the sending-slot semaphore.
    async fn job_sender_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut rx = self.bus.subscribe();
        loop {
            while let Some((assignment, host_ip, job)) = self.scheduler.get_task_to_send() {
                let permit = match self.send_slots.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let master = self.clone();
                tokio::spawn(async move {
                    let exec = master.build_exec(&assignment, &job);
                    let result = master.exec_transport.send_exec(&host_ip, exec).await;
                    if let Err(e) = &result {
                        tracing::warn!(ip = %host_ip, job_id = job.id(), error = %e, "exec send failed");
                    }
                    master
                        .scheduler
                        .on_task_send_completion(result.is_ok(), &assignment, &host_ip);
                    drop(permit);
                });
            }

            if !wait_for(&mut rx, BusEvent::TasksAvailable, &shutdown).await {
                return;
            }
        }
    }

    fn build_exec(&self, assignment: &WorkerJob, job: &crate::job::Job) -> proto::ExecScript {
        let tasks: Vec<u32> = assignment
            .tasks_of(job.id())
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        proto::ExecScript {
            language: job.language().to_string(),
            script: job.script().to_string(),
            job_id: job.id(),
            task_id: tasks.first().copied().unwrap_or(0),
            master_id: self.master_id.clone(),
            num_tasks: tasks.len() as u32,
            tasks,
            timeout: job.timeouts().task_timeout,
        }
    }

    /// Drains per-worker command queues; a failed send goes back through
    /// the timeout manager with exponential backoff.
    async fn command_sender_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let retry = RetryPolicy {
            base_delay_secs: self.config.command_retry_delay,
            max_retries: self.config.command_max_retries,
        };
        let mut rx = self.bus.subscribe();
        loop {
            while let Some((pending, host_ip)) = self.registry.pop_command() {
                let message = pending.command.to_message(&self.master_id);
                match self.command_transport.send_command(&host_ip, message).await {
                    Ok(err_code) => {
                        if err_code != 0 {
                            tracing::warn!(ip = %host_ip, err_code, command = ?pending.command, "command rejected by worker");
                        }
                    }
                    Err(e) => match retry.next_delay(pending.attempts) {
                        Some(delay) => {
                            tracing::warn!(ip = %host_ip, error = %e, attempt = pending.attempts, "command send failed, will retry");
                            let retry_command = PendingCommand {
                                command: pending.command,
                                attempts: pending.attempts + 1,
                            };
                            self.timeouts
                                .push_command_retry(retry_command, &host_ip, delay);
                        }
                        None => {
                            tracing::error!(ip = %host_ip, command = ?pending.command, "command dropped after max retries");
                        }
                    },
                }
            }

            if !wait_for(&mut rx, BusEvent::CommandsAvailable, &shutdown).await {
                return;
            }
        }
    }

    /// Counts silent heartbeat intervals and reports newly lost workers to
    /// the scheduler.
    async fn heartbeat_watchdog(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_timeout.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately; skip it
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    let dropped = self.registry.check_heartbeats();
                    if !dropped.is_empty() {
                        self.scheduler.on_changed_worker_state(&dropped);
                    }
                }
            }
        }
    }

    /// Entry point for datagrams from workers (heartbeats, completion
    /// pings). Anything else is logged and dropped.
    pub fn handle_message(self: &Arc<Self>, host_ip: &str, message: Message) {
        match message {
            Message::Heartbeat(hb) => self.handle_heartbeat(host_ip, &hb),
            Message::JobCompletionPing(ping) => self.handle_completion_ping(host_ip, ping),
            other => {
                tracing::warn!(ip = %host_ip, message = ?other, "unexpected message from worker");
            }
        }
    }

    pub fn handle_heartbeat(&self, host_ip: &str, hb: &proto::Heartbeat) {
        if let Some(worker) = self.registry.on_heartbeat(host_ip, hb) {
            self.scheduler.on_host_appearance(worker);
        }
    }

    /// A worker announced a finished task; fetch its result under the
    /// result-getter semaphore and feed the scheduler.
    pub fn handle_completion_ping(self: &Arc<Self>, host_ip: &str, ping: proto::JobCompletionPing) {
        let master = self.clone();
        let host_ip = host_ip.to_string();
        tokio::spawn(async move {
            let permit = match master.result_slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let request = proto::GetResult {
                master_id: master.master_id.clone(),
                job_id: ping.job_id,
                task_id: ping.task_id,
            };
            match master.exec_transport.get_result(&host_ip, request).await {
                Ok(result) => {
                    master.scheduler.on_task_completion(
                        result.err_code,
                        result.exec_time,
                        WorkerTask::new(ping.job_id, ping.task_id),
                        &host_ip,
                    );
                }
                Err(e) => {
                    tracing::warn!(ip = %host_ip, job_id = ping.job_id, task_id = ping.task_id, error = %e, "get_result failed");
                }
            }
            drop(permit);
        });
    }
}

impl TimeoutHandler for Master {
    /// A queue deadline only applies while the job is still queued; a job
    /// that started executing is governed by its job timeout.
    fn on_queue_timeout(&self, job_id: JobId) {
        if self.queue.delete(job_id) {
            tracing::info!(job_id, "job dropped on queue timeout");
            self.bus.notify(BusEvent::TasksAvailable);
        }
    }

    fn on_job_timeout(&self, job_id: JobId) {
        self.scheduler.on_job_timeout(job_id);
    }

    fn on_task_timeout(&self, task: WorkerTask, host_ip: &str) {
        self.scheduler.on_task_timeout(task, host_ip);
    }

    fn on_command_retry(&self, command: PendingCommand, host_ip: &str) {
        if self.registry.requeue_command(host_ip, command) {
            self.bus.notify(BusEvent::CommandsAvailable);
        }
    }
}

/// Wait until `wanted` (or a lagged receiver, which may have swallowed it)
/// arrives. Returns false on shutdown or a closed bus.
async fn wait_for(
    rx: &mut broadcast::Receiver<BusEvent>,
    wanted: BusEvent,
    shutdown: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return false,
            event = rx.recv() => match event {
                Ok(e) if e == wanted => return true,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return true,
                Err(broadcast::error::RecvError::Closed) => return false,
            },
        }
    }
}
