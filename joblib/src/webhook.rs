//! Best-effort terminal notifications.
//!
//! One POST per job, sent from a detached task. Failures are logged and
//! dropped: nothing is retried and the job record is never touched.

use crate::errors::Result;
use crate::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of the notification POST.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalNotification {
    pub id: JobId,
    pub status: JobStatus,
    pub result_url: String,
}

#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Fire and forget. Returns the handle of the delivery task so tests can
    /// await it; callers normally drop it.
    pub fn notify(
        &self,
        url: String,
        notification: TerminalNotification,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        tokio::spawn(async move {
            tracing::debug!(%url, job_id = %notification.id, status = %notification.status, "sending webhook");
            match client.post(&url).json(&notification).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!(
                        %url,
                        job_id = %notification.id,
                        http_status = response.status().as_u16(),
                        "webhook rejected"
                    );
                }
                Err(err) => {
                    tracing::warn!(%url, job_id = %notification.id, error = %err, "webhook delivery failed");
                }
            }
        })
    }
}
