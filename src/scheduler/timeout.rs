//! Time-ordered queue of scheduler deadlines: queue timeouts, job timeouts,
//! per-task timeouts, and command resend delays.
//!
//! One task owns a min-heap over monotonic `Instant`s and sleeps until the
//! head fires. Cancellation is lazy: entries for removed jobs fire and are
//! ignored by the handler.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::job::JobId;
use crate::worker::{PendingCommand, WorkerTask};

#[derive(Debug, Clone)]
pub enum TimeoutKind {
    QueueTimeout(JobId),
    JobTimeout(JobId),
    TaskTimeout {
        task: WorkerTask,
        host_ip: String,
    },
    CommandRetry {
        command: PendingCommand,
        host_ip: String,
    },
}

#[derive(Debug)]
struct Entry {
    fire_at: Instant,
    seq: u64,
    kind: TimeoutKind,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // reversed for min-heap behavior; seq keeps equal instants FIFO
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Producer side of the timeout queue. Timeouts ≤ 0 are ignored where the
/// job model uses -1 for "no timeout".
pub trait TimeoutSink: Send + Sync {
    fn push_queue_timeout(&self, job_id: JobId, timeout_secs: i64);
    fn push_job_timeout(&self, job_id: JobId, timeout_secs: i64);
    fn push_task_timeout(&self, task: WorkerTask, host_ip: &str, timeout_secs: i64);
    fn push_command_retry(&self, command: PendingCommand, host_ip: &str, delay_secs: u64);
}

/// Consumer side: what fires when a deadline expires.
pub trait TimeoutHandler: Send + Sync {
    fn on_queue_timeout(&self, job_id: JobId);
    fn on_job_timeout(&self, job_id: JobId);
    fn on_task_timeout(&self, task: WorkerTask, host_ip: &str);
    fn on_command_retry(&self, command: PendingCommand, host_ip: &str);
}

pub struct TimeoutManager {
    tx: mpsc::UnboundedSender<Entry>,
    seq: AtomicU64,
}

impl TimeoutManager {
    pub fn new() -> (std::sync::Arc<Self>, TimeoutQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                tx,
                seq: AtomicU64::new(0),
            }),
            TimeoutQueue {
                rx,
                heap: BinaryHeap::new(),
            },
        )
    }

    fn push(&self, delay: Duration, kind: TimeoutKind) {
        let entry = Entry {
            fire_at: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            kind,
        };
        // send fails only after the queue task stopped, i.e. at shutdown
        let _ = self.tx.send(entry);
    }
}

impl TimeoutSink for TimeoutManager {
    fn push_queue_timeout(&self, job_id: JobId, timeout_secs: i64) {
        if timeout_secs >= 0 {
            self.push(
                Duration::from_secs(timeout_secs as u64),
                TimeoutKind::QueueTimeout(job_id),
            );
        }
    }

    fn push_job_timeout(&self, job_id: JobId, timeout_secs: i64) {
        if timeout_secs >= 0 {
            self.push(
                Duration::from_secs(timeout_secs as u64),
                TimeoutKind::JobTimeout(job_id),
            );
        }
    }

    fn push_task_timeout(&self, task: WorkerTask, host_ip: &str, timeout_secs: i64) {
        if timeout_secs >= 0 {
            self.push(
                Duration::from_secs(timeout_secs as u64),
                TimeoutKind::TaskTimeout {
                    task,
                    host_ip: host_ip.to_string(),
                },
            );
        }
    }

    fn push_command_retry(&self, command: PendingCommand, host_ip: &str, delay_secs: u64) {
        self.push(
            Duration::from_secs(delay_secs),
            TimeoutKind::CommandRetry {
                command,
                host_ip: host_ip.to_string(),
            },
        );
    }
}

pub struct TimeoutQueue {
    rx: mpsc::UnboundedReceiver<Entry>,
    heap: BinaryHeap<Entry>,
}

impl TimeoutQueue {
    pub async fn run(mut self, handler: std::sync::Arc<dyn TimeoutHandler>, shutdown: CancellationToken) {
        loop {
            let next_fire = self.heap.peek().map(|e| e.fire_at);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                entry = self.rx.recv() => {
                    match entry {
                        Some(entry) => self.heap.push(entry),
                        None => break,
                    }
                }
                _ = async {
                    match next_fire {
                        Some(at) => tokio::time::sleep_until(at.into()).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.dispatch_expired(handler.as_ref());
                }
            }
        }
    }

    fn dispatch_expired(&mut self, handler: &dyn TimeoutHandler) {
        let now = Instant::now();
        while let Some(head) = self.heap.peek() {
            if head.fire_at > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry");
            match entry.kind {
                TimeoutKind::QueueTimeout(job_id) => handler.on_queue_timeout(job_id),
                TimeoutKind::JobTimeout(job_id) => handler.on_job_timeout(job_id),
                TimeoutKind::TaskTimeout { task, host_ip } => {
                    handler.on_task_timeout(task, &host_ip)
                }
                TimeoutKind::CommandRetry { command, host_ip } => {
                    handler.on_command_retry(command, &host_ip)
                }
            }
        }
    }
}
