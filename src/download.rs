use std::fs;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::HarvestError;

/// Suffix the browser uses while a download is still being written.
pub const PARTIAL_SUFFIX: &str = ".crdownload";

/// Directory the browser drops downloaded files into.
#[derive(Debug, Clone)]
pub struct DropDir {
    path: Utf8PathBuf,
}

impl DropDir {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Finished files with their modification times.
    pub fn complete_files(&self) -> Result<Vec<(Utf8PathBuf, SystemTime)>, HarvestError> {
        if !self.path.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("read {}: {err}", self.path)))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.as_str().ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, modified));
        }
        Ok(files)
    }

    pub fn newest_complete(&self) -> Result<Option<Utf8PathBuf>, HarvestError> {
        Ok(self
            .complete_files()?
            .into_iter()
            .max_by_key(|(_, modified)| *modified)
            .map(|(path, _)| path))
    }

    /// Removes finished files left over from earlier attempts. Returns how many
    /// were removed.
    pub fn clear_stale(&self) -> usize {
        let Ok(files) = self.complete_files() else {
            return 0;
        };
        files
            .into_iter()
            .filter(|(path, _)| fs::remove_file(path.as_std_path()).is_ok())
            .count()
    }

    /// Polls until a finished file shows up or `timeout` passes.
    pub fn wait_for_artifact(
        &self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Option<Utf8PathBuf>, HarvestError> {
        let start = Instant::now();
        loop {
            if let Some(path) = self.newest_complete()? {
                return Ok(Some(path));
            }
            if start.elapsed() >= timeout {
                tracing::warn!(
                    "no download completed within {:.1} seconds",
                    timeout.as_secs_f64()
                );
                return Ok(None);
            }
            thread::sleep(poll_interval);
        }
    }
}
