//! Wire protocol: a length-prefixed JSON envelope shared by the worker RPC,
//! heartbeat, and completion-ping paths.
//!
//! A frame is the decimal byte length of the remainder, a newline, then the
//! envelope `{"protocol":"json","version":1,"type":...,"body":{...}}`.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u32 = 1;

/// Error codes reported by worker nodes.
pub const NODE_OK: i32 = 0;
/// The worker has no completion record for (jobId, taskId), i.e. a
/// duplicate or stale get_result. Ignored by the scheduler.
pub const NODE_JOB_COMPLETION_NOT_FOUND: i32 = -2;
/// Synthesized by the master when a task exceeds its timeout.
pub const NODE_JOB_TIMEOUT: i32 = -3;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    protocol: String,
    version: u32,
    #[serde(flatten)]
    message: Message,
}

/// Every message the master produces or consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Message {
    Exec(ExecScript),
    GetResult(GetResult),
    JobResult(JobResult),
    StopTask(StopTask),
    StopAllJobs(StopAllJobs),
    StopPreviousJobs(StopPreviousJobs),
    SendCommandResult(SendCommandResult),
    JobCompletionPing(JobCompletionPing),
    Heartbeat(Heartbeat),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecScript {
    pub language: String,
    /// Base64-encoded script bytes.
    pub script: String,
    pub job_id: i64,
    /// Lowest task id of the batch.
    pub task_id: u32,
    pub master_id: String,
    pub tasks: Vec<u32>,
    pub num_tasks: u32,
    /// Per-task timeout in seconds, -1 for none.
    pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResult {
    pub master_id: String,
    pub job_id: i64,
    pub task_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub err_code: i32,
    /// Task wall time in milliseconds.
    pub exec_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTask {
    pub master_id: String,
    pub job_id: i64,
    pub task_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAllJobs {
    pub master_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPreviousJobs {
    pub master_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCommandResult {
    pub err_code: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletionPing {
    pub job_id: i64,
    pub task_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    #[serde(rename = "numCPU")]
    pub num_cpu: u32,
    #[serde(rename = "memorySizeMB")]
    pub memory_size_mb: u64,
    pub host: String,
    pub group: String,
}

/// Serialize a message into a wire frame.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let envelope = Envelope {
        protocol: PROTOCOL_NAME.to_string(),
        version: PROTOCOL_VERSION,
        message: message.clone(),
    };
    let json = serde_json::to_string(&envelope)?;
    let mut frame = Vec::with_capacity(json.len() + 12);
    frame.extend_from_slice(format!("{}\n", json.len()).as_bytes());
    frame.extend_from_slice(json.as_bytes());
    Ok(frame)
}

/// Parse one frame from the front of `buf`. Returns the message and the
/// number of bytes consumed, or `None` if the buffer doesn't hold a full
/// frame yet.
pub fn decode(buf: &[u8]) -> Result<Option<(Message, usize)>> {
    let newline = match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let len_str = std::str::from_utf8(&buf[..newline])
        .map_err(|_| GridError::Protocol("non-utf8 length prefix".into()))?;
    let len: usize = len_str
        .trim()
        .parse()
        .map_err(|_| GridError::Protocol(format!("bad length prefix: {:?}", len_str)))?;

    let start = newline + 1;
    if buf.len() < start + len {
        return Ok(None);
    }
    let payload = &buf[start..start + len];
    let envelope: Envelope = serde_json::from_slice(payload)?;
    if envelope.protocol != PROTOCOL_NAME {
        return Err(GridError::Protocol(format!(
            "unknown protocol: {:?}",
            envelope.protocol
        )));
    }
    if envelope.version != PROTOCOL_VERSION {
        return Err(GridError::Protocol(format!(
            "unsupported protocol version: {}",
            envelope.version
        )));
    }
    Ok(Some((envelope.message, start + len)))
}
