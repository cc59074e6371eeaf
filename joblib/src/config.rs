use crate::types::JobId;
use std::path::PathBuf;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Settings fixed for the lifetime of a [`crate::JobEngine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// One sub-directory per job is created here.
    pub jobs_dir: PathBuf,
    /// Where submitted stdin payloads wait until their job exits.
    pub staging_dir: PathBuf,
    /// Capacity of the intake queue. Submitters block while it is full.
    pub queue_capacity: usize,
    /// Ceiling on concurrently running children. `None` means unbounded.
    pub max_concurrent: Option<usize>,
    /// Prepended to every submitted argument vector.
    pub command_prefix: Vec<String>,
    /// Prefix for the URLs handed back to clients and webhooks.
    pub base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("jobs"),
            staging_dir: std::env::temp_dir(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_concurrent: None,
            command_prefix: Vec::new(),
            base_url: String::new(),
        }
    }
}

impl EngineConfig {
    pub fn links(&self) -> JobLinks {
        JobLinks::new(&self.base_url)
    }
}

/// Builds the client-facing URLs of a job.
#[derive(Clone, Debug, Default)]
pub struct JobLinks {
    base_url: String,
}

impl JobLinks {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn status_url(&self, id: JobId) -> String {
        self.job_url(id, "status")
    }

    pub fn result_url(&self, id: JobId) -> String {
        self.job_url(id, "result")
    }

    pub fn log_url(&self, id: JobId) -> String {
        self.job_url(id, "log")
    }

    fn job_url(&self, id: JobId, endpoint: &str) -> String {
        format!("{}/jobs/{}/{}", self.base_url, id, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn links_without_base_are_relative() {
        let id = Uuid::new_v4();
        let links = JobLinks::new("");
        assert_eq!(links.result_url(id), format!("/jobs/{}/result", id));
    }

    #[test]
    fn links_join_base_without_double_slash() {
        let id = Uuid::new_v4();
        let links = JobLinks::new("https://runner.example/");
        assert_eq!(
            links.log_url(id),
            format!("https://runner.example/jobs/{}/log", id)
        );
        assert_eq!(
            links.status_url(id),
            format!("https://runner.example/jobs/{}/status", id)
        );
    }
}
