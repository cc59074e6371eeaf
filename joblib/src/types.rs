use crate::errors::{JobError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub type JobId = Uuid;
pub type Args = Vec<String>;
pub type InputBlob = bytes::Bytes;
pub type Timestamp = DateTime<Utc>;

/// Lifecycle of a job.
///
/// `InQueue` is set at admission. `InProgress` is only reached once the child
/// process has been spawned. The last three states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            JobStatus::InQueue | JobStatus::InProgress => false,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InQueue => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted record of one job.
///
/// `id`, `args`, `mime_type`, `webhook` and `enqueued_at` are fixed at creation.
/// The remaining fields only change through the transition methods below, which
/// refuse to move a job out of a terminal state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub args: Args,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub enqueued_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        args: Args,
        mime_type: Option<String>,
        webhook: Option<String>,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id,
            args,
            mime_type,
            webhook,
            status: JobStatus::InQueue,
            pid: None,
            enqueued_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// `IN_QUEUE -> IN_PROGRESS`, capturing the child's pid and start time together.
    pub fn mark_started(&mut self, pid: Option<u32>, at: Timestamp) -> Result<()> {
        self.check_transition(JobStatus::InProgress)?;
        self.status = JobStatus::InProgress;
        self.pid = pid;
        self.started_at = Some(at);
        Ok(())
    }

    /// `IN_QUEUE -> FAILED` when the process never started.
    pub fn mark_spawn_failed(&mut self, at: Timestamp) -> Result<()> {
        self.check_transition(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.pid = None;
        self.started_at = Some(at);
        self.completed_at = Some(at);
        Ok(())
    }

    /// Moves an in-flight job to a terminal state.
    pub fn mark_finished(&mut self, status: JobStatus, at: Timestamp) -> Result<()> {
        if !status.is_terminal() {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.check_transition(status)?;
        self.completed_at = Some(at);
        self.status = status;
        self.pid = None;
        Ok(())
    }

    /// Fails a record that a previous server process left unfinished.
    pub fn mark_interrupted(&mut self, at: Timestamp) -> Result<()> {
        self.check_transition(JobStatus::Failed)?;
        self.started_at.get_or_insert(at);
        self.completed_at = Some(at);
        self.status = JobStatus::Failed;
        self.pid = None;
        Ok(())
    }

    fn check_transition(&self, to: JobStatus) -> Result<()> {
        use JobStatus::*;
        let allowed = match (self.status, to) {
            (InQueue, InProgress) => true,
            (InQueue, Failed) => true,
            (InProgress, Completed | Failed | Canceled) => true,
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(JobError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}

/// A job submission before admission.
#[derive(Clone, Debug, Default)]
pub struct Submission {
    pub args: Args,
    pub mime_type: Option<String>,
    pub webhook: Option<String>,
    pub input: Option<InputBlob>,
}

/// An admitted job waiting in the intake queue.
#[derive(Debug)]
pub struct QueuedJob {
    pub record: JobRecord,
    pub input_path: Option<PathBuf>,
}

/// A captured output file of a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            Uuid::new_v4(),
            vec!["echo".into(), "hi".into()],
            None,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let parsed: JobStatus = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(parsed, JobStatus::Canceled);
        assert!(serde_json::from_str::<JobStatus>("\"RUNNING\"").is_err());
    }

    #[test]
    fn happy_path_transitions() {
        let mut rec = record();
        let now = Utc::now();
        rec.mark_started(Some(42), now).unwrap();
        assert_eq!(rec.status, JobStatus::InProgress);
        assert_eq!(rec.pid, Some(42));
        assert_eq!(rec.started_at, Some(now));

        rec.mark_finished(JobStatus::Completed, now).unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.pid, None);
        assert_eq!(rec.completed_at, Some(now));
    }

    #[test]
    fn spawn_failure_skips_in_progress() {
        let mut rec = record();
        let now = Utc::now();
        rec.mark_spawn_failed(now).unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.started_at, rec.completed_at);
        assert_eq!(rec.pid, None);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut rec = record();
        let now = Utc::now();
        rec.mark_started(Some(1), now).unwrap();
        rec.mark_finished(JobStatus::Canceled, now).unwrap();

        assert!(rec.mark_finished(JobStatus::Completed, now).is_err());
        assert!(rec.mark_started(Some(2), now).is_err());
        assert!(rec.mark_interrupted(now).is_err());
        assert_eq!(rec.status, JobStatus::Canceled);
    }

    #[test]
    fn finish_requires_terminal_target_and_running_job() {
        let mut rec = record();
        let now = Utc::now();
        assert!(rec.mark_finished(JobStatus::Completed, now).is_err());
        rec.mark_started(None, now).unwrap();
        assert!(rec.mark_finished(JobStatus::InQueue, now).is_err());
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let rec = record();
        let value = serde_json::to_value(&rec).unwrap();
        assert!(value.get("pid").is_none());
        assert!(value.get("started_at").is_none());
        assert!(value.get("webhook").is_none());
        assert_eq!(value["status"], "IN_QUEUE");
    }
}
