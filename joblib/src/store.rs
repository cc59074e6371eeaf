//! On-disk job metadata.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<job id>/meta.json    the JobRecord
//! <root>/<job id>/stdout.txt   captured standard output (the result)
//! <root>/<job id>/stderr.txt   captured standard error (the log)
//! ```
//!
//! Every save rewrites the whole document into a temporary sibling and renames
//! it over `meta.json`, so pollers never read a half-written record.

use crate::errors::{JobError, Result};
use crate::types::{JobId, JobRecord};
use futures::future::join_all;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const META_FILE: &str = "meta.json";
const STDOUT_FILE: &str = "stdout.txt";
const STDERR_FILE: &str = "stderr.txt";

#[derive(Clone, Debug)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    /// Opens the store, creating the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, id: JobId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn stdout_path(&self, id: JobId) -> PathBuf {
        self.job_dir(id).join(STDOUT_FILE)
    }

    pub fn stderr_path(&self, id: JobId) -> PathBuf {
        self.job_dir(id).join(STDERR_FILE)
    }

    fn meta_path(&self, id: JobId) -> PathBuf {
        self.job_dir(id).join(META_FILE)
    }

    /// Provisions the job directory and writes the first version of the record.
    pub async fn create(&self, record: &JobRecord) -> Result<()> {
        fs::create_dir_all(self.job_dir(record.id)).await?;
        self.save(record).await
    }

    /// Deletes the job directory with everything in it. Missing is fine.
    pub async fn remove(&self, id: JobId) -> Result<()> {
        match fs::remove_dir_all(self.job_dir(id)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Replaces the stored record. Last write wins.
    pub async fn save(&self, record: &JobRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)?;
        let path = self.meta_path(record.id);
        let tmp = self
            .job_dir(record.id)
            .join(format!(".{}.tmp-{}", META_FILE, Uuid::new_v4()));
        fs::write(&tmp, &data).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn load(&self, id: JobId) -> Result<JobRecord> {
        match fs::read(self.meta_path(id)).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(JobError::NotFound(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// All readable records, newest first.
    ///
    /// Directories that are not job directories, or whose record is missing or
    /// unparseable, are skipped.
    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(|name| Uuid::parse_str(name).ok()) {
                Some(id) => ids.push(id),
                None => tracing::debug!(entry = ?name, "skipping non-job directory"),
            }
        }

        let loaded = join_all(ids.into_iter().map(|id| self.load(id))).await;
        let mut records: Vec<JobRecord> = loaded
            .into_iter()
            .filter_map(|res| match res {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable job record");
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        Ok(records)
    }
}
