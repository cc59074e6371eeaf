use crate::actors::{dispatcher::Dispatcher, registry::RegistryHandle, supervisor::Supervisor};
use crate::config::{EngineConfig, JobLinks};
use crate::errors::{JobError, Result};
use crate::queue::{intake_queue, IntakeQueue, IntakeSlot};
use crate::store::MetadataStore;
use crate::types::{Artifact, JobId, JobRecord, JobStatus, QueuedJob, Submission};
use crate::webhook::WebhookNotifier;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

/// The job execution engine.
///
/// `JobEngine::spawn` starts the running registry actor and the dispatcher
/// task; this struct is the handle to them plus the metadata store. It can be
/// cloned freely and shared between request handlers.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    store: MetadataStore,
    intake: IntakeQueue,
    registry: RegistryHandle,
    links: JobLinks,
}

impl JobEngine {
    /// Opens the storage directories and starts the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn spawn(config: EngineConfig) -> Result<Self> {
        let store = MetadataStore::open(&config.jobs_dir).await?;
        fs::create_dir_all(&config.staging_dir).await?;
        reconcile_orphans(&store).await?;

        let registry = RegistryHandle::spawn();
        let notifier = WebhookNotifier::new()?;
        let links = config.links();
        let (intake, drain) = intake_queue(config.queue_capacity);
        let supervisor = Supervisor::new(store.clone(), registry.clone(), notifier, links.clone());
        Dispatcher::spawn(drain, supervisor, config.max_concurrent);

        tracing::info!(
            jobs_dir = %store.root().display(),
            queue_capacity = config.queue_capacity,
            max_concurrent = ?config.max_concurrent,
            command_prefix = ?config.command_prefix,
            "job engine started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                intake,
                registry,
                links,
            }),
        })
    }

    pub fn links(&self) -> &JobLinks {
        &self.inner.links
    }

    /// Admits a job: persists its record as `IN_QUEUE`, stages its input and
    /// enqueues it. Waits while the intake queue is full.
    ///
    /// A job is either fully admitted or leaves nothing behind. Once a queue
    /// slot is held the admission runs to the end even if this future is
    /// dropped.
    pub async fn submit(&self, submission: Submission) -> Result<JobRecord> {
        if submission.args.is_empty() {
            return Err(JobError::EmptyArgs);
        }
        let slot = self.inner.intake.reserve().await?;
        let engine = self.clone();
        tokio::spawn(async move { engine.admit(submission, slot).await }).await?
    }

    async fn admit(&self, submission: Submission, slot: IntakeSlot) -> Result<JobRecord> {
        let Submission {
            args,
            mime_type,
            webhook,
            input,
        } = submission;
        let prefix = &self.inner.config.command_prefix;
        let args = prefix.iter().cloned().chain(args).collect();

        let id = Uuid::new_v4();
        let record = JobRecord::new(id, args, mime_type, webhook, Utc::now());

        let input_path = match input.filter(|blob| !blob.is_empty()) {
            Some(blob) => {
                let path = self.staged_input_path(id);
                if let Err(err) = fs::write(&path, &blob).await {
                    let _ = fs::remove_file(&path).await;
                    return Err(err.into());
                }
                Some(path)
            }
            None => None,
        };

        if let Err(err) = self.inner.store.create(&record).await {
            if let Err(cleanup) = self.inner.store.remove(id).await {
                tracing::warn!(job_id = %id, error = %cleanup, "failed to remove partial job directory");
            }
            if let Some(path) = &input_path {
                let _ = fs::remove_file(path).await;
            }
            return Err(err);
        }

        slot.enqueue(QueuedJob {
            record: record.clone(),
            input_path,
        });
        tracing::info!(job_id = %id, args = ?record.args, "job admitted");
        Ok(record)
    }

    pub async fn status(&self, id: JobId) -> Result<JobRecord> {
        self.inner.store.load(id).await
    }

    /// Every known job, newest first.
    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        self.inner.store.list().await
    }

    /// The captured stdout of a job, available once it has `COMPLETED`.
    pub async fn result(&self, id: JobId) -> Result<Artifact> {
        let record = self.inner.store.load(id).await?;
        if record.status != JobStatus::Completed {
            return Err(JobError::ResultUnavailable {
                id,
                status: record.status,
            });
        }
        Ok(Artifact {
            path: self.inner.store.stdout_path(id),
            mime_type: record.mime_type,
        })
    }

    /// The captured stderr of a job, available as soon as the file exists.
    pub async fn log(&self, id: JobId) -> Result<Artifact> {
        let path = self.inner.store.stderr_path(id);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Artifact {
                path,
                mime_type: None,
            }),
            _ => Err(JobError::NotFound(id)),
        }
    }

    /// Requests cancellation of a running job. Returns whether one was found.
    pub async fn cancel(&self, id: JobId) -> Result<bool> {
        self.inner.registry.request_cancellation(id).await
    }

    pub async fn running_count(&self) -> Result<usize> {
        self.inner.registry.running_count().await
    }

    fn staged_input_path(&self, id: JobId) -> PathBuf {
        self.inner
            .config
            .staging_dir
            .join(format!("input-{}.tmp", id))
    }
}

/// Fails jobs that a previous server process left queued or running.
async fn reconcile_orphans(store: &MetadataStore) -> Result<()> {
    for mut record in store.list().await? {
        if record.status.is_terminal() {
            continue;
        }
        let previous = record.status;
        record.mark_interrupted(Utc::now())?;
        store.save(&record).await?;
        tracing::warn!(job_id = %record.id, %previous, "marked orphaned job as failed");
    }
    Ok(())
}
