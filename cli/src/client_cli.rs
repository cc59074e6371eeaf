use joblib::types::{Args, JobId, Timestamp};
use joblib::{JobRecord, JobStatus};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered {status}: {message}")]
    Server { status: u16, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Deserialize)]
struct JobSummary {
    id: JobId,
    args: Args,
    status: JobStatus,
    enqueued_at: Timestamp,
}

pub struct ClientCli {
    http: reqwest::Client,
    server: String,
}

impl ClientCli {
    pub fn connect(server: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    pub async fn submit(
        &self,
        args: Args,
        mime_type: Option<String>,
        webhook: Option<String>,
        input: Option<Vec<u8>>,
    ) -> Result<()> {
        let body = submission_body(args, mime_type, webhook, input)?;
        let response = self
            .http
            .post(self.url("/jobs"))
            .body(body)
            .send()
            .await?;
        let created: serde_json::Value = checked(response).await?.json().await?;
        println!("{}", serde_json::to_string_pretty(&created)?);
        Ok(())
    }

    pub async fn list(&self) -> Result<()> {
        let response = self.http.get(self.url("/jobs")).send().await?;
        let jobs: Vec<JobSummary> = checked(response).await?.json().await?;
        for job in jobs {
            println!(
                "{}  {:<11}  {}  {}",
                job.id,
                job.status,
                job.enqueued_at.to_rfc3339(),
                job.args.join(" ")
            );
        }
        Ok(())
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobRecord> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{}/status", job_id)))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn print_status(&self, job_id: JobId) -> Result<()> {
        let record = self.status(job_id).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        Ok(())
    }

    /// convenience function
    pub async fn print_result(&self, job_id: JobId) -> Result<()> {
        self.print_artifact(&format!("/jobs/{}/result", job_id)).await
    }

    /// convenience function
    pub async fn print_log(&self, job_id: JobId) -> Result<()> {
        self.print_artifact(&format!("/jobs/{}/log", job_id)).await
    }

    pub async fn cancel(&self, job_id: JobId) -> Result<()> {
        let response = self
            .http
            .put(self.url(&format!("/jobs/{}/cancel", job_id)))
            .send()
            .await?;
        checked(response).await?;
        println!("Cancel requested for job id: {}", job_id);
        Ok(())
    }

    /// Polls until the job is terminal and returns its final status.
    pub async fn wait(&self, job_id: JobId, interval: Duration) -> Result<JobStatus> {
        loop {
            let record = self.status(job_id).await?;
            if record.status.is_terminal() {
                println!("{}", record.status);
                return Ok(record.status);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Copy the artifact to stdout as it arrives
    async fn print_artifact(&self, path: &str) -> Result<()> {
        let mut response = checked(self.http.get(self.url(path)).send().await?).await?;
        let mut stdout = tokio::io::stdout();
        while let Some(chunk) = response.chunk().await? {
            stdout.write_all(&chunk).await?;
        }
        stdout.flush().await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }
}

/// The JSON request, then a newline, then the raw stdin payload.
fn submission_body(
    args: Args,
    mime_type: Option<String>,
    webhook: Option<String>,
    input: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    let mut request = json!({ "args": args });
    if let Some(mime_type) = mime_type {
        request["mime_type"] = json!(mime_type);
    }
    if let Some(webhook) = webhook {
        request["webhook"] = json!(webhook);
    }
    let mut body = serde_json::to_vec(&request)?;
    if let Some(input) = input {
        body.push(b'\n');
        body.extend_from_slice(&input);
    }
    Ok(body)
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_string))
        .unwrap_or(text);
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}
