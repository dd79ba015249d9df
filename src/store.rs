use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::error::HarvestError;

/// On-disk layout of a harvest output root.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn matrices_dir(&self) -> Utf8PathBuf {
        self.root.join("matrices")
    }

    pub fn metadata_dir(&self) -> Utf8PathBuf {
        self.root.join("metadata")
    }

    pub fn progress_dir(&self) -> Utf8PathBuf {
        self.root.join("progress")
    }

    pub fn download_dir(&self) -> Utf8PathBuf {
        self.root.join("temp_downloads")
    }

    pub fn progress_path(&self) -> Utf8PathBuf {
        self.progress_dir().join("download_progress.json")
    }

    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.progress_dir().join("completed_tfs.txt")
    }

    pub fn family_log_path(&self) -> Utf8PathBuf {
        self.progress_dir().join("tf_family_results.txt")
    }

    pub fn ensure_layout(&self) -> Result<(), HarvestError> {
        for dir in [
            self.matrices_dir(),
            self.metadata_dir(),
            self.progress_dir(),
            self.download_dir(),
        ] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| HarvestError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), HarvestError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Writes through a temp file in the destination directory and renames it
    /// into place, so readers never observe a half-written file.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
        let parent = path
            .parent()
            .ok_or_else(|| HarvestError::Filesystem(format!("invalid destination path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".psfm-harvest")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }

    pub fn append_line(path: &Utf8Path, line: &str) -> Result<(), HarvestError> {
        Self::append_text(path, &format!("{line}\n"))
    }

    pub fn append_text(path: &Utf8Path, text: &str) -> Result<(), HarvestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("open {path}: {err}")))?;
        file.write_all(text.as_bytes())
            .map_err(|err| HarvestError::Filesystem(format!("append {path}: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("out"));
        assert!(store.progress_path().ends_with("progress/download_progress.json"));
        assert!(store.ledger_path().ends_with("progress/completed_tfs.txt"));
        assert!(store.family_log_path().ends_with("progress/tf_family_results.txt"));
        assert!(store.download_dir().ends_with("temp_downloads"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("file.json");

        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "second");
        let leftovers = fs::read_dir(root.join("nested").as_std_path())
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }
}
