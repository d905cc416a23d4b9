//! Job records on disk
//!
//! One pretty-printed JSON file per job under the state directory
//! (`~/.local/state/edgex/jobs/<id>.json`).

use migrate::{JobStore, MigrationJob, StoreError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the default state directory
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::new(crate::paths::jobs_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_file(&self, id: &str) -> Result<PathBuf, StoreError> {
        // Ids become file names
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl JobStore for FileJobStore {
    fn save(&self, job: &MigrationJob) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let path = self.job_file(&job.id)?;
        let content = serde_json::to_string_pretty(job)?;

        // Readers must never see a half-written record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;

        log::debug!("Saved job {} to {}", job.id, path.display());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<MigrationJob, StoreError> {
        let path = self.job_file(id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn list(&self) -> Result<Vec<MigrationJob>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|content| Ok(serde_json::from_str::<MigrationJob>(&content)?));
            match parsed {
                Ok(job) => jobs.push(job),
                Err(e) => log::warn!("Skipping unreadable job file {}: {e}", path.display()),
            }
        }

        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }
}
