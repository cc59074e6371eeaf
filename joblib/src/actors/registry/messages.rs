use crate::types::JobId;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum RegistryMessage {
    Register {
        job_id: JobId,
        pid: Option<u32>,
        token: CancellationToken,
    },
    Unregister {
        job_id: JobId,
    },
    Cancel {
        job_id: JobId,
        response: oneshot::Sender<bool>,
    },
    Count {
        response: oneshot::Sender<usize>,
    },
}
