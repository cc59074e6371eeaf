use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Submit and inspect jobs on a jobrunner server
#[derive(Debug, Parser)]
#[clap(name = "jobctl", version)]
pub struct ArgParser {
    /// The base URL of the server
    #[clap(
        short = 's',
        long = "server",
        env = "JOBRUNNER_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub server: String,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// submit a new job
    Submit {
        #[clap(long)]
        /// content type to serve the job's result with
        mime_type: Option<String>,

        #[clap(long)]
        /// URL notified once the job finishes
        webhook: Option<String>,

        #[clap(long, parse(from_os_str))]
        /// file fed to the job's stdin, `-` reads this process's stdin
        input: Option<PathBuf>,

        #[clap(last = true, required = true)]
        /// the command to run followed by its arguments
        args: Vec<String>,
    },
    /// list all jobs, newest first
    List,
    /// print a job's full record
    Status {
        /// Uuid v4 string
        job_id: Uuid,
    },
    /// print a completed job's stdout
    #[clap(name = "result")]
    JobResult {
        /// Uuid v4 string
        job_id: Uuid,
    },
    /// print a job's stderr
    Log {
        /// Uuid v4 string
        job_id: Uuid,
    },
    /// cancel a running job
    Cancel {
        /// Uuid v4 string
        job_id: Uuid,
    },
    /// poll a job until it finishes, exit non-zero unless it completed
    Wait {
        /// Uuid v4 string
        job_id: Uuid,

        #[clap(long, default_value = "500")]
        /// delay between polls
        interval_ms: u64,
    },
}
