mod actor;
mod messages;

use crate::errors::{JobError, Result};
use crate::types::JobId;
use actor::Actor;
use messages::RegistryMessage;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// The table of in-flight jobs, used only to route cancellation to a live child.
///
/// This struct is an actor handle. The map lives inside the actor spawned by
/// `RegistryHandle::spawn`, and every insert, lookup and delete is one message,
/// so nothing is ever held across a spawn or a wait.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::UnboundedSender<RegistryMessage>,
}

impl RegistryHandle {
    pub fn spawn() -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox);
        Self { sender }
    }

    /// Called by the supervisor right after a successful spawn.
    pub fn register(&self, job_id: JobId, pid: Option<u32>, token: CancellationToken) {
        let _ = self
            .sender
            .send(RegistryMessage::Register { job_id, pid, token });
    }

    /// Called by the supervisor as soon as the child has exited.
    pub fn unregister(&self, job_id: JobId) {
        let _ = self.sender.send(RegistryMessage::Unregister { job_id });
    }

    /// Fires the job's cancellation token if it is running.
    ///
    /// Returns whether a running job was found. Unknown, queued and finished
    /// jobs are silently ignored.
    pub async fn request_cancellation(&self, job_id: JobId) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Cancel {
                job_id,
                response: tx,
            })
            .map_err(|_| JobError::RegistryClosed)?;
        rx.await.map_err(|_| JobError::RegistryClosed)
    }

    /// Number of jobs currently running.
    pub async fn running_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Count { response: tx })
            .map_err(|_| JobError::RegistryClosed)?;
        rx.await.map_err(|_| JobError::RegistryClosed)
    }
}
