use clap::Parser;
use joblib::EngineConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Run submitted commands as supervised child processes over HTTP
#[derive(Debug, Parser)]
#[clap(name = "jobrunner", version)]
pub struct ServerArgs {
    /// Address to listen on
    #[clap(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// Directory holding one sub-directory per job
    #[clap(long, env = "JOBS_DIR", default_value = "jobs")]
    pub jobs_dir: PathBuf,

    /// Directory for staged stdin payloads [default: the OS temp dir]
    #[clap(long, env = "STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Prefix for every URL handed back to clients and webhooks
    #[clap(long, env = "BASE_URL", default_value = "")]
    pub base_url: String,

    /// Enable debug logging
    #[clap(long, env = "DEBUG")]
    pub debug: bool,

    /// How many admitted jobs may wait for execution before submitters block
    #[clap(long, env = "QUEUE_CAPACITY", default_value = "100")]
    pub queue_capacity: usize,

    /// Ceiling on concurrently running jobs [default: unbounded]
    #[clap(long, env = "MAX_CONCURRENT_JOBS")]
    pub max_concurrent_jobs: Option<usize>,

    /// Largest accepted submission body, staged input included
    #[clap(long, env = "MAX_BODY_BYTES", default_value = "67108864")]
    pub max_body_bytes: usize,

    /// Fixed command prepended to every submitted argument vector
    #[clap(last = true)]
    pub command_prefix: Vec<String>,
}

impl ServerArgs {
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            jobs_dir: self.jobs_dir.clone(),
            staging_dir: self.staging_dir.clone().unwrap_or(defaults.staging_dir),
            queue_capacity: self.queue_capacity,
            max_concurrent: self.max_concurrent_jobs,
            command_prefix: self.command_prefix.clone(),
            base_url: self.base_url.clone(),
        }
    }
}
