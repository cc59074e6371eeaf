//! The bounded FIFO between admission and execution.

use crate::errors::{JobError, Result};
use crate::types::QueuedJob;
use tokio::sync::mpsc;

/// Submitting side of the intake queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct IntakeQueue {
    sender: mpsc::Sender<QueuedJob>,
}

/// Draining side of the intake queue, owned by the dispatcher.
#[derive(Debug)]
pub struct IntakeDrain {
    receiver: mpsc::Receiver<QueuedJob>,
}

pub fn intake_queue(capacity: usize) -> (IntakeQueue, IntakeDrain) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (IntakeQueue { sender }, IntakeDrain { receiver })
}

/// A reserved place in the intake queue. Dropping it frees the place.
#[derive(Debug)]
pub struct IntakeSlot {
    permit: mpsc::OwnedPermit<QueuedJob>,
}

impl IntakeQueue {
    /// Waits for a free slot when the queue is full.
    ///
    /// Nothing is admitted until the slot is used, so abandoning the wait
    /// leaves no trace.
    pub async fn reserve(&self) -> Result<IntakeSlot> {
        self.sender
            .clone()
            .reserve_owned()
            .await
            .map(|permit| IntakeSlot { permit })
            .map_err(|_| JobError::QueueClosed)
    }
}

impl IntakeSlot {
    /// Never waits: the place was taken by `reserve`.
    pub fn enqueue(self, job: QueuedJob) {
        self.permit.send(job);
    }
}

impl IntakeDrain {
    /// Next job in admission order, or `None` once every `IntakeQueue` is gone.
    pub async fn dequeue(&mut self) -> Option<QueuedJob> {
        self.receiver.recv().await
    }
}
