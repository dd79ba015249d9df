use std::fs;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::WorkItem;
use crate::error::HarvestError;
use crate::store::Store;

pub const METADATA_SUFFIX: &str = ".meta";

const HASH_CHARS: usize = 8;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-]").expect("sanitize pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub family_name: String,
    pub individual_name: String,
    pub species_name: String,
    pub family_numeric_id: u64,
    pub species_numeric_id: u64,
    pub filename: String,
    pub content_hash: String,
    pub content_length: usize,
    pub downloaded_at: String,
    pub source_url: Option<String>,
    pub tool: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub filename: String,
    pub matrix_path: Utf8PathBuf,
    pub metadata_path: Utf8PathBuf,
    pub content_hash: String,
}

pub fn sanitize(name: &str) -> String {
    NON_WORD.replace_all(name, "_").into_owned()
}

/// First eight hex characters of the SHA-256 of `content`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_CHARS);
    hash
}

pub fn artifact_filename(item: &WorkItem, hash: &str) -> String {
    format!(
        "{}_{}_{}_TF{}_SP{}_{}.txt",
        sanitize(&item.family_name),
        sanitize(&item.individual_name),
        sanitize(&item.species_name),
        item.family_numeric_id,
        item.species_numeric_id,
        hash
    )
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    matrices_dir: Utf8PathBuf,
    metadata_dir: Utf8PathBuf,
}

impl ArtifactStore {
    pub fn new(store: &Store) -> Self {
        Self {
            matrices_dir: store.matrices_dir(),
            metadata_dir: store.metadata_dir(),
        }
    }

    /// Writes the matrix and its metadata sidecar. A matrix created by this call
    /// is removed again when its sidecar cannot be written, and the error is
    /// returned.
    pub fn save(
        &self,
        item: &WorkItem,
        content: &str,
        source_url: Option<&str>,
    ) -> Result<SavedArtifact, HarvestError> {
        let hash = content_hash(content);
        let filename = artifact_filename(item, &hash);
        let matrix_path = self.matrices_dir.join(&filename);
        let metadata_path = self
            .metadata_dir
            .join(format!("{filename}{METADATA_SUFFIX}"));

        // Identical content maps to the same file, which an earlier run may own.
        let existed = matrix_path.exists();
        Store::write_bytes_atomic(&matrix_path, content.as_bytes())?;

        let metadata = ArtifactMetadata {
            family_name: item.family_name.clone(),
            individual_name: item.individual_name.clone(),
            species_name: item.species_name.clone(),
            family_numeric_id: item.family_numeric_id,
            species_numeric_id: item.species_numeric_id,
            filename: filename.clone(),
            content_hash: hash.clone(),
            content_length: content.chars().count(),
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            source_url: source_url.map(str::to_string),
            tool: format!("psfm-harvest/{}", env!("CARGO_PKG_VERSION")),
        };
        if let Err(err) = Store::write_json_atomic(&metadata_path, &metadata) {
            if !existed {
                if let Err(remove_err) = fs::remove_file(matrix_path.as_std_path()) {
                    tracing::warn!("failed to roll back {matrix_path}: {remove_err}");
                }
            }
            return Err(err);
        }

        tracing::info!("saved {} -> {filename}", item.label());
        Ok(SavedArtifact {
            filename,
            matrix_path,
            metadata_path,
            content_hash: hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem {
            family_name: "AraC/XylS".to_string(),
            individual_name: "AraC".to_string(),
            species_name: "Escherichia coli K-12".to_string(),
            family_numeric_id: 12,
            species_numeric_id: 34,
            report_url: String::new(),
        }
    }

    #[test]
    fn filename_is_sanitized() {
        let name = artifact_filename(&item(), "deadbeef");
        assert_eq!(
            name,
            "AraC_XylS_AraC_Escherichia_coli_K-12_TF12_SP34_deadbeef.txt"
        );
    }

    #[test]
    fn hash_is_short_and_stable() {
        let a = content_hash(">motif\n0.1 0.2 0.3 0.4");
        assert_eq!(a.len(), 8);
        assert_eq!(a, content_hash(">motif\n0.1 0.2 0.3 0.4"));
        assert_ne!(a, content_hash(">motif\n0.4 0.3 0.2 0.1"));
    }
}
