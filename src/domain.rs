use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl fmt::Display for FamilyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FamilyStatus::Pending => write!(f, "pending"),
            FamilyStatus::InProgress => write!(f, "in_progress"),
            FamilyStatus::Completed => write!(f, "completed"),
            FamilyStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    #[default]
    Pending,
    Completed,
    NoExport,
    Failed,
}

impl WorkItemStatus {
    /// Settled outcomes are never retried on a later run.
    pub fn is_settled(self) -> bool {
        matches!(self, WorkItemStatus::Completed | WorkItemStatus::NoExport)
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemStatus::Pending => write!(f, "pending"),
            WorkItemStatus::Completed => write!(f, "completed"),
            WorkItemStatus::NoExport => write!(f, "no_export"),
            WorkItemStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A link as seen on a listing page, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub text: String,
    pub target_url: Option<String>,
}

impl RawCandidate {
    pub fn new(text: impl Into<String>, target_url: Option<String>) -> Self {
        Self {
            text: text.into(),
            target_url,
        }
    }
}

/// A "view" link on a family page together with the text of its table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCandidate {
    pub link_text: String,
    pub target_url: Option<String>,
    pub row_cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    pub name: String,
    pub target_url: Option<String>,
    pub status: FamilyStatus,
}

impl Family {
    pub fn new(name: impl Into<String>, target_url: Option<String>) -> Self {
        Self {
            name: name.into(),
            target_url,
            status: FamilyStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub family_name: String,
    pub individual_name: String,
    pub species_name: String,
    pub family_numeric_id: u64,
    pub species_numeric_id: u64,
    pub report_url: String,
}

impl WorkItem {
    pub fn key(&self) -> WorkItemKey {
        WorkItemKey::new(
            &self.family_name,
            &self.species_name,
            self.family_numeric_id,
            self.species_numeric_id,
        )
    }

    pub fn label(&self) -> String {
        format!("{} - {}", self.individual_name, self.species_name)
    }
}

/// Stable identity of a work item across runs.
///
/// Renders as `<family>_<species>#<tf id>-<species id>` with spaces replaced by
/// underscores. The numeric suffix keeps two reports apart when the family and
/// species names collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItemKey(String);

impl WorkItemKey {
    pub fn new(family: &str, species: &str, family_id: u64, species_id: u64) -> Self {
        let readable = format!("{family}_{species}").replace(' ', "_");
        Self(format!("{readable}#{family_id}-{species_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
