use crate::actors::registry::RegistryHandle;
use crate::config::JobLinks;
use crate::store::MetadataStore;
use crate::types::{JobRecord, JobStatus, QueuedJob, Timestamp};
use crate::webhook::{TerminalNotification, WebhookNotifier};
use chrono::Utc;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::fs;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// How a job's execution ended, before it is written to the record.
enum Outcome {
    SpawnFailed { at: Timestamp },
    Exited { status: JobStatus, at: Timestamp },
}

/// Owns the lifecycle of each job it is handed: spawn, stream wiring, wait,
/// cancellation, and every status write after admission.
#[derive(Clone)]
pub struct Supervisor {
    store: MetadataStore,
    registry: RegistryHandle,
    notifier: WebhookNotifier,
    links: JobLinks,
}

impl Supervisor {
    pub fn new(
        store: MetadataStore,
        registry: RegistryHandle,
        notifier: WebhookNotifier,
        links: JobLinks,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
            links,
        }
    }

    /// Runs one job until it reaches a terminal state.
    pub async fn run(&self, job: QueuedJob) {
        let QueuedJob {
            mut record,
            input_path,
        } = job;
        let job_id = record.id;

        let outcome = self.execute(&mut record, input_path.as_deref()).await;

        if let Some(path) = &input_path {
            discard_input(path).await;
        }

        let applied = match outcome {
            Outcome::SpawnFailed { at } => record.mark_spawn_failed(at),
            Outcome::Exited { status, at } => record.mark_finished(status, at),
        };
        if let Err(err) = applied {
            tracing::error!(%job_id, error = %err, "refusing status change");
            return;
        }
        if !self.persist(&record).await {
            tracing::warn!(%job_id, status = %record.status, "terminal status not saved, skipping webhook");
            return;
        }
        tracing::info!(%job_id, status = %record.status, "job finished");

        if let Some(url) = &record.webhook {
            self.notifier.notify(
                url.clone(),
                TerminalNotification {
                    id: job_id,
                    status: record.status,
                    result_url: self.links.result_url(job_id),
                },
            );
        }
    }

    async fn execute(&self, record: &mut JobRecord, input: Option<&Path>) -> Outcome {
        let job_id = record.id;
        let mut child = match self.spawn_child(record, input).await {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(%job_id, args = ?record.args, error = %err, "failed to start job");
                return Outcome::SpawnFailed { at: Utc::now() };
            }
        };

        // register before IN_PROGRESS is visible, so anyone who sees it can cancel
        let pid = child.id();
        let token = CancellationToken::new();
        self.registry.register(job_id, pid, token.clone());
        if let Err(err) = record.mark_started(pid, Utc::now()) {
            tracing::error!(%job_id, error = %err, "refusing status change");
        }
        self.persist(record).await;
        tracing::info!(%job_id, pid = ?pid, "job started");

        let waited = tokio::select! {
            exit_status = child.wait() => Some(exit_status),
            _ = token.cancelled() => None,
        };
        let exit_status = match waited {
            Some(exit_status) => exit_status,
            None => {
                if let Err(err) = child.kill().await {
                    tracing::warn!(%job_id, error = %err, "failed to kill canceled job");
                }
                child.wait().await
            }
        };
        let at = Utc::now();
        self.registry.unregister(job_id);

        log_exit(record, &exit_status);
        Outcome::Exited {
            status: resolve_status(token.is_cancelled(), &exit_status),
            at,
        }
    }

    async fn spawn_child(&self, record: &JobRecord, input: Option<&Path>) -> io::Result<Child> {
        let (program, args) = record.args.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector")
        })?;

        let stdout = fs::File::create(self.store.stdout_path(record.id))
            .await?
            .into_std()
            .await;
        let stderr = fs::File::create(self.store.stderr_path(record.id))
            .await?
            .into_std()
            .await;
        let stdin = match input {
            Some(path) => match fs::File::open(path).await {
                Ok(file) => Stdio::from(file.into_std().await),
                Err(err) => {
                    tracing::warn!(job_id = %record.id, path = %path.display(), error = %err, "staged input unreadable, running without stdin");
                    Stdio::null()
                }
            },
            None => Stdio::null(),
        };

        tracing::debug!(job_id = %record.id, args = ?record.args, "spawning job");
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(stdin)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        command.spawn()
    }

    /// Whether the record reached disk.
    async fn persist(&self, record: &JobRecord) -> bool {
        match self.store.save(record).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(job_id = %record.id, status = %record.status, error = %err, "failed to persist job record");
                false
            }
        }
    }
}

/// Cancellation wins over whatever the child reported.
fn resolve_status(canceled: bool, exit_status: &io::Result<ExitStatus>) -> JobStatus {
    if canceled {
        return JobStatus::Canceled;
    }
    match exit_status {
        Ok(status) if status.success() => JobStatus::Completed,
        _ => JobStatus::Failed,
    }
}

fn log_exit(record: &JobRecord, exit_status: &io::Result<ExitStatus>) {
    match exit_status {
        Ok(status) => {
            if let Some(code) = status.code() {
                tracing::info!(job_id = %record.id, code, "job exited");
            } else if let Some(signal) = status.signal() {
                tracing::info!(job_id = %record.id, signal, "job killed by signal");
            }
        }
        Err(err) => tracing::warn!(job_id = %record.id, error = %err, "waiting on job failed"),
    }
}

async fn discard_input(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove staged input");
        }
    }
}
