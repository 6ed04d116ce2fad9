use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// Master configuration, loadable from a JSON config file.
///
/// Every field has a default so a missing key in the file falls back to
/// something workable; `MasterConfig::default()` is what the tests run on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Worker RPC port (exec / get_result / commands).
    pub node_port: u16,
    /// UDP port workers listen on for master pings.
    pub node_udp_port: u16,
    /// UDP port the master receives heartbeats and completion pings on.
    pub master_udp_port: u16,
    /// TCP port for admin connections.
    pub master_admin_port: u16,

    pub num_ping_receiver_thread: usize,
    pub num_job_send_thread: usize,
    pub num_result_getter_thread: usize,
    pub max_simult_result_getters: usize,
    pub send_buffer_size: usize,
    pub max_simult_sending_jobs: usize,

    /// Seconds between heartbeat checks; a worker that stays silent for
    /// `heartbeat_max_droped` consecutive checks goes not-available.
    pub heartbeat_timeout: u64,
    pub heartbeat_max_droped: u32,

    /// Base delay in seconds for command resend backoff.
    pub command_retry_delay: u64,
    pub command_max_retries: u32,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            node_port: 5555,
            node_udp_port: 5556,
            master_udp_port: 5558,
            master_admin_port: 5557,
            num_ping_receiver_thread: 1,
            num_job_send_thread: 2,
            num_result_getter_thread: 2,
            max_simult_result_getters: 32,
            send_buffer_size: 64 * 1024,
            max_simult_sending_jobs: 32,
            heartbeat_timeout: 3,
            heartbeat_max_droped: 3,
            command_retry_delay: 1,
            command_max_retries: 5,
        }
    }
}

impl MasterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| GridError::Config(format!("couldn't open {}: {}", path.display(), e)))?;
        let cfg = serde_json::from_str(&data)
            .map_err(|e| GridError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(cfg)
    }
}

/// One line of the hosts inventory: `host group cpu memory_mb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub host: String,
    pub group: String,
    pub cpu: u32,
    pub memory_mb: u64,
}

/// Parse the hosts inventory file. Blank lines and `#` comments are skipped.
pub fn read_hosts(path: &Path) -> Result<Vec<HostEntry>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| GridError::Hosts(format!("couldn't open {}: {}", path.display(), e)))?;
    parse_hosts(&data)
}

pub fn parse_hosts(data: &str) -> Result<Vec<HostEntry>> {
    let mut entries = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let entry = (|| {
            let host = fields.next()?.to_string();
            let group = fields.next()?.to_string();
            let cpu = fields.next()?.parse().ok()?;
            let memory_mb = fields.next()?.parse().ok()?;
            Some(HostEntry {
                host,
                group,
                cpu,
                memory_mb,
            })
        })();
        match entry {
            Some(e) => entries.push(e),
            None => {
                return Err(GridError::Hosts(format!(
                    "malformed hosts line {}: {:?}",
                    lineno + 1,
                    line
                )))
            }
        }
    }
    Ok(entries)
}
