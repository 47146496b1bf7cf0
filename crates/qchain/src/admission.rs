use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::common::config::AdmissionConfig;
use crate::common::error::QchainError;
use crate::common::utils::fs::is_hidden;

/// Submission channel through a shared directory that is drained by an external process.
///
/// The directory holds at most `ceiling` scripts. When it is full, the controller waits
/// `backoff` and checks again, giving up after `max_retries` waits.
pub struct AdmissionController {
    directory: PathBuf,
    ceiling: usize,
    backoff: Duration,
    max_retries: u32,
}

impl AdmissionController {
    pub fn new(directory: PathBuf, ceiling: usize, backoff: Duration, max_retries: u32) -> Self {
        Self {
            directory,
            ceiling,
            backoff,
            max_retries,
        }
    }

    pub fn from_config(config: &AdmissionConfig, directory: PathBuf) -> Self {
        Self::new(
            directory,
            config.ceiling,
            config.backoff,
            config.max_retries,
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of scripts staged in the directory that were not drained yet.
    /// Hidden files (including scripts that are being staged) are not counted.
    pub fn staged_count(&self) -> crate::Result<usize> {
        if !self.directory.is_dir() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.is_file() && !is_hidden(&path) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Stages `scripts` once there is room for all of them.
    ///
    /// Scripts are copied into the admission directory; the originals stay where they were
    /// written, so the scripts directory keeps a record of everything that was handed over.
    /// Returns the staged paths, in the order of `scripts`.
    pub async fn enqueue(&self, scripts: &[PathBuf]) -> crate::Result<Vec<PathBuf>> {
        let incoming = scripts.len();
        let mut retries = 0;
        loop {
            let staged = self.staged_count()?;
            if staged + incoming <= self.ceiling {
                break;
            }
            if retries >= self.max_retries {
                return Err(QchainError::AdmissionFailure {
                    staged,
                    incoming,
                    ceiling: self.ceiling,
                    attempts: retries + 1,
                });
            }
            retries += 1;
            log::info!(
                "Admission directory {} is full ({staged} staged, {incoming} incoming, ceiling {}), \
                retrying in {} ({retries}/{})",
                self.directory.display(),
                self.ceiling,
                humantime::format_duration(self.backoff),
                self.max_retries
            );
            tokio::time::sleep(self.backoff).await;
        }

        scripts.iter().map(|script| self.stage(script)).collect()
    }

    /// Copies `script` into the directory so that it becomes visible only when complete.
    fn stage(&self, script: &Path) -> crate::Result<PathBuf> {
        std::fs::create_dir_all(&self.directory)?;
        let content = std::fs::read(script)?;

        let mut file = NamedTempFile::with_prefix_in(".staging", &self.directory)?;
        file.write_all(&content)?;
        file.as_file().sync_all()?;

        let name = script
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script.sh".to_string());
        let mut suffix = 0;
        loop {
            let destination = if suffix == 0 {
                self.directory.join(&name)
            } else {
                self.directory.join(format!("{suffix}-{name}"))
            };
            match file.persist_noclobber(&destination) {
                Ok(_) => {
                    log::debug!(
                        "Staged {} as {}",
                        script.display(),
                        destination.display()
                    );
                    return Ok(destination);
                }
                Err(error) if error.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    file = error.file;
                    suffix += 1;
                }
                Err(error) => return Err(error.error.into()),
            }
        }
    }
}

/// Maps `id` into the id space of the admission channel.
///
/// Ids falling into the `reserved` trailing ids of the space are moved down by the number of
/// active stages.
pub fn fold_job_id(id: u64, id_space: u64, reserved: u64, active_stages: u64) -> u64 {
    if id_space == 0 {
        return id;
    }
    let folded = id % id_space;
    if reserved > 0 && folded >= id_space.saturating_sub(reserved) {
        folded.saturating_sub(active_stages)
    } else {
        folded
    }
}
