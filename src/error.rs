use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Hosts file error: {0}")]
    Hosts(String),

    #[error("Bad job description: {0}")]
    JobDescription(String),

    #[error("Job graph has a cycle")]
    CyclicJobGraph,

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GridError>;
