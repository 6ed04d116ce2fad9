//! Socket plumbing for the daemon: framed TCP clients for worker RPC and
//! the UDP receiver for heartbeats and completion pings.
//!
//! The core never calls sockets directly; it sees only the
//! [`ExecTransport`]/[`CommandTransport`] traits this module implements.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

use crate::error::{GridError, Result};
use crate::master::{CommandTransport, ExecTransport, Master};
use crate::proto::{self, Message};

const MAX_FRAME: usize = 8 * 1024 * 1024;

/// Framed JSON RPC to a worker's TCP port.
pub struct TcpWorkerTransport {
    node_port: u16,
    buffer_size: usize,
}

impl TcpWorkerTransport {
    pub fn new(node_port: u16, buffer_size: usize) -> Self {
        Self {
            node_port,
            buffer_size: buffer_size.max(512),
        }
    }

    async fn connect(&self, host_ip: &str) -> Result<TcpStream> {
        TcpStream::connect((host_ip, self.node_port))
            .await
            .map_err(|e| GridError::Transport(format!("connect {}: {}", host_ip, e)))
    }

    async fn send_frame(&self, stream: &mut TcpStream, message: &Message) -> Result<()> {
        let frame = proto::encode(message)?;
        stream
            .write_all(&frame)
            .await
            .map_err(|e| GridError::Transport(format!("write: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| GridError::Transport(format!("flush: {}", e)))?;
        Ok(())
    }

    async fn read_frame(&self, stream: &mut TcpStream) -> Result<Message> {
        let mut buf = Vec::with_capacity(self.buffer_size);
        let mut chunk = vec![0u8; self.buffer_size];
        loop {
            if let Some((message, _)) = proto::decode(&buf)? {
                return Ok(message);
            }
            if buf.len() > MAX_FRAME {
                return Err(GridError::Protocol("oversized frame".into()));
            }
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| GridError::Transport(format!("read: {}", e)))?;
            if n == 0 {
                return Err(GridError::Transport("connection closed mid-frame".into()));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[async_trait]
impl ExecTransport for TcpWorkerTransport {
    async fn send_exec(&self, host_ip: &str, exec: proto::ExecScript) -> Result<()> {
        let mut stream = self.connect(host_ip).await?;
        self.send_frame(&mut stream, &Message::Exec(exec)).await
    }

    async fn get_result(
        &self,
        host_ip: &str,
        request: proto::GetResult,
    ) -> Result<proto::JobResult> {
        let mut stream = self.connect(host_ip).await?;
        self.send_frame(&mut stream, &Message::GetResult(request))
            .await?;
        match self.read_frame(&mut stream).await? {
            Message::JobResult(result) => Ok(result),
            other => Err(GridError::Protocol(format!(
                "unexpected get_result response: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl CommandTransport for TcpWorkerTransport {
    async fn send_command(&self, host_ip: &str, message: Message) -> Result<i32> {
        let mut stream = self.connect(host_ip).await?;
        self.send_frame(&mut stream, &message).await?;
        match self.read_frame(&mut stream).await? {
            Message::SendCommandResult(result) => Ok(result.err_code),
            other => Err(GridError::Protocol(format!(
                "unexpected command response: {:?}",
                other
            ))),
        }
    }
}

/// Receive heartbeats and job completion pings until shutdown. The socket
/// is shared, so several receiver tasks can drain it concurrently.
pub async fn run_ping_receiver(
    master: Arc<Master>,
    socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "udp receive failed");
                        continue;
                    }
                };
                let host_ip = peer.ip().to_string();
                match proto::decode(&buf[..len]) {
                    Ok(Some((message, _))) => master.handle_message(&host_ip, message),
                    Ok(None) => {
                        tracing::warn!(ip = %host_ip, "truncated datagram");
                    }
                    Err(e) => {
                        tracing::warn!(ip = %host_ip, error = %e, "bad datagram");
                    }
                }
            }
        }
    }
}
