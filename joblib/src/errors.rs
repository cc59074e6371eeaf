use crate::types::{JobId, JobStatus};
use std::{io, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("result of job {id} is not available while it is {status}")]
    ResultUnavailable { id: JobId, status: JobStatus },
    #[error("a job needs at least one argument naming the executable")]
    EmptyArgs,
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("intake queue is closed")]
    QueueClosed,
    #[error("running registry has exited")]
    RegistryClosed,
    #[error("admission of a job was interrupted: {0}")]
    AdmissionAborted(#[from] tokio::task::JoinError),
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed job record: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl JobError {
    /// Whether the error means "no such job / artifact" to a caller.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JobError::NotFound(_) | JobError::ResultUnavailable { .. }
        )
    }
}

pub type Result<T> = result::Result<T, JobError>;
