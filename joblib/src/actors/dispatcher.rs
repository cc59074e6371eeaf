use super::supervisor::Supervisor;
use crate::queue::IntakeDrain;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Drains the intake queue and gives every job its own task.
///
/// With no permit pool the number of running jobs is unbounded. With one, the
/// dispatcher stops draining while every permit is held, so the intake queue
/// holds exactly its capacity and further submitters wait.
pub struct Dispatcher {
    intake: IntakeDrain,
    supervisor: Supervisor,
    permits: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn spawn(intake: IntakeDrain, supervisor: Supervisor, max_concurrent: Option<usize>) {
        let dispatcher = Self {
            intake,
            supervisor,
            permits: max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        };
        tokio::spawn(async move { dispatcher.run().await });
    }

    async fn run(mut self) {
        loop {
            // a permit first, so a job only leaves the queue when it can start
            let permit = match &self.permits {
                Some(permits) => match permits.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    // the semaphore is never closed
                    Err(_) => None,
                },
                None => None,
            };
            let job = match self.intake.dequeue().await {
                Some(job) => job,
                None => break,
            };
            tracing::debug!(job_id = %job.record.id, "dispatching job");
            let supervisor = self.supervisor.clone();
            tokio::spawn(async move {
                supervisor.run(job).await;
                drop(permit);
            });
        }
        tracing::debug!("intake queue closed, dispatcher exiting");
    }
}
