//! Outbound worker control commands and their resend policy.

use crate::job::{JobId, TaskId};
use crate::proto::{self, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    StopTask { job_id: JobId, task_id: TaskId },
    StopAllJobs,
    StopPreviousJobs,
}

impl WorkerCommand {
    pub fn to_message(&self, master_id: &str) -> Message {
        match *self {
            WorkerCommand::StopTask { job_id, task_id } => Message::StopTask(proto::StopTask {
                master_id: master_id.to_string(),
                job_id,
                task_id,
            }),
            WorkerCommand::StopAllJobs => Message::StopAllJobs(proto::StopAllJobs {
                master_id: master_id.to_string(),
            }),
            WorkerCommand::StopPreviousJobs => {
                Message::StopPreviousJobs(proto::StopPreviousJobs {
                    master_id: master_id.to_string(),
                })
            }
        }
    }
}

/// A command waiting in a worker's outbound queue, with its delivery
/// attempt count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: WorkerCommand,
    pub attempts: u32,
}

impl PendingCommand {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            attempts: 0,
        }
    }
}

/// Exponential backoff for command resends: `base * 2^attempt`, up to
/// `max_retries` attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay_secs: u64,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Delay before the next attempt, or `None` when the command should be
    /// dropped.
    pub fn next_delay(&self, attempts: u32) -> Option<u64> {
        if attempts >= self.max_retries {
            return None;
        }
        Some(self.base_delay_secs.saturating_mul(1u64 << attempts.min(16)))
    }
}
