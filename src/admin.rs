//! Admin surface: newline-delimited JSON commands over TCP.
//!
//! Requests are `{"command": ..., ...}`; malformed requests are logged and
//! dropped without touching scheduler state.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::job::{GroupId, JobId};
use crate::master::Master;

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AdminRequest {
    /// Ingest a job (or `.meta` DAG) description file.
    Job { file: PathBuf },
    Stop { job_id: JobId },
    StopGroup { group_id: GroupId },
    StopAll,
    StopPrev,
    Info { job_id: JobId },
    Stat,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub result: String,
}

pub struct AdminService {
    master: Arc<Master>,
}

impl AdminService {
    pub fn new(master: Arc<Master>) -> Self {
        Self { master }
    }

    /// Parse and execute one request line. `None` means the line was
    /// dropped as unparseable.
    pub fn handle_line(&self, line: &str) -> Option<AdminResponse> {
        match serde_json::from_str::<AdminRequest>(line) {
            Ok(request) => Some(AdminResponse {
                result: self.execute(request),
            }),
            Err(e) => {
                tracing::warn!(error = %e, line, "bad admin request");
                None
            }
        }
    }

    pub fn execute(&self, request: AdminRequest) -> String {
        match request {
            AdminRequest::Job { file } => match self.master.job_manager().submit_file(&file) {
                Ok(jobs) => {
                    let ids: Vec<String> = jobs.iter().map(|j| j.id().to_string()).collect();
                    format!("submitted job(s): {}", ids.join(", "))
                }
                Err(e) => format!("error: {}", e),
            },
            AdminRequest::Stop { job_id } => {
                if self.master.scheduler().stop_job(job_id) {
                    format!("job stopped, jobId = {}", job_id)
                } else {
                    format!("job not found, jobId = {}", job_id)
                }
            }
            AdminRequest::StopGroup { group_id } => {
                self.master.scheduler().stop_job_group(group_id);
                format!("group stopped, groupId = {}", group_id)
            }
            AdminRequest::StopAll => {
                self.master.scheduler().stop_all_jobs();
                "all jobs stopped".to_string()
            }
            AdminRequest::StopPrev => {
                self.master.scheduler().stop_previous_jobs();
                "stop-previous broadcast".to_string()
            }
            AdminRequest::Info { job_id } => self.master.scheduler().job_info(job_id),
            AdminRequest::Stat => self.master.scheduler().statistics(),
        }
    }

    /// Accept admin connections until shutdown.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "admin connection");
                        let service = self.clone();
                        let conn_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = service.serve_connection(stream, conn_shutdown).await {
                                tracing::debug!(%peer, error = %e, "admin connection closed");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "admin accept failed"),
                },
            }
        }
    }

    async fn serve_connection(
        &self,
        stream: TcpStream,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                line = lines.next_line() => {
                    let Some(line) = line? else { return Ok(()) };
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(response) = self.handle_line(&line) {
                        let mut payload = serde_json::to_vec(&response)?;
                        payload.push(b'\n');
                        write_half.write_all(&payload).await?;
                    }
                }
            }
        }
    }
}
