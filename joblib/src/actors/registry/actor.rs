use super::messages::RegistryMessage;
use crate::types::JobId;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A job whose child process is alive.
struct RunningJob {
    pid: Option<u32>,
    token: CancellationToken,
}

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<RegistryMessage>,
    running: HashMap<JobId, RunningJob>,
}

impl Actor {
    pub fn spawn(inbox: mpsc::UnboundedReceiver<RegistryMessage>) {
        let actor = Self {
            inbox,
            running: HashMap::new(),
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use RegistryMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Register { job_id, pid, token } => {
                    self.running.insert(job_id, RunningJob { pid, token });
                }
                Unregister { job_id } => {
                    self.running.remove(&job_id);
                }
                Cancel { job_id, response } => {
                    let _ = response.send(self.cancel(job_id));
                }
                Count { response } => {
                    let _ = response.send(self.running.len());
                }
            }
        }
        // every handle dropped: nobody can cancel anymore, children finish on their own
    }

    fn cancel(&self, job_id: JobId) -> bool {
        match self.running.get(&job_id) {
            Some(job) => {
                tracing::info!(%job_id, pid = ?job.pid, "cancellation requested");
                job.token.cancel();
                true
            }
            None => {
                tracing::debug!(%job_id, "cancel ignored, job is not running");
                false
            }
        }
    }
}
