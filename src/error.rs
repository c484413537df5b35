use std::time::Duration;
use thiserror::Error;

/// Reasons a submission is rejected before it enters the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Empty payload")]
    EmptyPayload,
    #[error("Payload exceeds the maximum message size")]
    PayloadTooLarge,
    #[error("Submission queue full")]
    QueueFull,
    #[error("Message or action pool exhausted")]
    Exhausted,
    #[error("Pipeline is not connected")]
    NotRunning,
}

/// Errors starting the pipeline.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("Failed to spawn stage thread: {0}")]
    Thread(std::io::Error),
    #[error("Socket error: {0}")]
    Socket(std::io::Error),
    #[error("Pipeline did not start within {0:?}")]
    Startup(Duration),
    #[error("Pipeline is already running")]
    AlreadyRunning,
}
