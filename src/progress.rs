//! Durable crawl checkpoint.
//!
//! Two files back the store: a JSON document keyed by family name that holds
//! every motif report outcome, and a flat ledger of completed family names.
//! Every update rewrites the whole JSON document atomically.

use std::collections::{BTreeMap, HashSet};
use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{FamilyStatus, WorkItem, WorkItemStatus};
use crate::error::HarvestError;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressRecord {
    pub families: BTreeMap<String, FamilyProgress>,
}

impl ProgressRecord {
    pub fn family(&self, name: &str) -> Option<&FamilyProgress> {
        self.families.get(name)
    }

    pub fn completed_families(&self) -> impl Iterator<Item = &str> {
        self.families
            .iter()
            .filter(|(_, family)| family.status == FamilyStatus::Completed)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyProgress {
    pub status: FamilyStatus,
    pub timestamp: String,
    #[serde(default)]
    pub details: FamilyDetails,
}

impl FamilyProgress {
    fn new(status: FamilyStatus) -> Self {
        Self {
            status,
            timestamp: iso_timestamp(),
            details: FamilyDetails::default(),
        }
    }

    /// A family is complete iff it has at least one report and all are completed.
    pub fn derived_status(&self) -> Option<FamilyStatus> {
        if self.details.motif_reports.is_empty() {
            return None;
        }
        let all_done = self
            .details
            .motif_reports
            .values()
            .all(|report| report.status == WorkItemStatus::Completed);
        Some(if all_done {
            FamilyStatus::Completed
        } else {
            FamilyStatus::InProgress
        })
    }

    pub fn completed_reports(&self) -> usize {
        self.details
            .motif_reports
            .values()
            .filter(|report| report.status == WorkItemStatus::Completed)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyDetails {
    #[serde(default)]
    pub motif_reports: BTreeMap<String, WorkItemProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemProgress {
    pub individual_name: String,
    pub species_name: String,
    pub family_numeric_id: u64,
    pub species_numeric_id: u64,
    pub status: WorkItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedProgress {
    pub completed: HashSet<String>,
    pub record: ProgressRecord,
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    progress_path: Utf8PathBuf,
    ledger_path: Utf8PathBuf,
}

impl ProgressStore {
    pub fn new(store: &Store) -> Self {
        Self {
            progress_path: store.progress_path(),
            ledger_path: store.ledger_path(),
        }
    }

    /// Reads the checkpoint. A missing or unreadable file degrades to empty
    /// state; this never fails.
    pub fn load(&self) -> LoadedProgress {
        let record = self.read_record();
        let mut completed = self.read_ledger();
        if !completed.is_empty() {
            tracing::info!("found {} previously completed TF families", completed.len());
        }
        completed.extend(record.completed_families().map(str::to_string));
        if !record.families.is_empty() {
            tracing::info!(
                "loaded progress data with {} entries",
                record.families.len()
            );
        }
        LoadedProgress { completed, record }
    }

    pub fn record_family_outcome(
        &self,
        name: &str,
        status: FamilyStatus,
        error: Option<String>,
    ) -> Result<(), HarvestError> {
        let mut record = self.read_record();
        let entry = record
            .families
            .entry(name.to_string())
            .or_insert_with(|| FamilyProgress::new(status));

        // The derived status wins over whatever the caller asked for.
        let status = match (status, entry.derived_status()) {
            (FamilyStatus::Completed, Some(FamilyStatus::InProgress)) => {
                return Err(HarvestError::IncompleteFamily(name.to_string()));
            }
            (_, Some(FamilyStatus::Completed)) => FamilyStatus::Completed,
            (status, _) => status,
        };

        entry.status = status;
        entry.timestamp = iso_timestamp();
        entry.details.error = error;
        self.write_record(&record)?;

        if status == FamilyStatus::Completed {
            self.append_ledger(name)?;
        }
        Ok(())
    }

    /// Registers newly discovered reports as pending, so a family is never
    /// derived complete while some of its reports were not yet attempted.
    /// Reports already on record keep their outcome.
    pub fn record_discovered_items(
        &self,
        family: &str,
        items: &[WorkItem],
    ) -> Result<(), HarvestError> {
        let mut record = self.read_record();
        let entry = record
            .families
            .entry(family.to_string())
            .or_insert_with(|| FamilyProgress::new(FamilyStatus::InProgress));

        let mut added = 0usize;
        for item in items {
            entry
                .details
                .motif_reports
                .entry(item.key().to_string())
                .or_insert_with(|| {
                    added += 1;
                    WorkItemProgress {
                        individual_name: item.individual_name.clone(),
                        species_name: item.species_name.clone(),
                        family_numeric_id: item.family_numeric_id,
                        species_numeric_id: item.species_numeric_id,
                        status: WorkItemStatus::Pending,
                        last_attempt: None,
                        detail: None,
                    }
                });
        }
        if added == 0 {
            return Ok(());
        }
        if let Some(derived) = entry.derived_status() {
            entry.status = derived;
        }
        self.write_record(&record)
    }

    pub fn record_work_item_outcome(
        &self,
        family: &str,
        item: &WorkItem,
        status: WorkItemStatus,
        detail: Option<String>,
    ) -> Result<(), HarvestError> {
        let mut record = self.read_record();
        let entry = record
            .families
            .entry(family.to_string())
            .or_insert_with(|| FamilyProgress::new(FamilyStatus::InProgress));
        let was_completed = entry.status == FamilyStatus::Completed;

        entry.details.motif_reports.insert(
            item.key().to_string(),
            WorkItemProgress {
                individual_name: item.individual_name.clone(),
                species_name: item.species_name.clone(),
                family_numeric_id: item.family_numeric_id,
                species_numeric_id: item.species_numeric_id,
                status,
                last_attempt: Some(iso_timestamp()),
                detail,
            },
        );

        if let Some(derived) = entry.derived_status() {
            entry.status = derived;
            entry.timestamp = iso_timestamp();
            if derived == FamilyStatus::Completed {
                entry.details.error = None;
            }
        }
        let now_completed = entry.status == FamilyStatus::Completed;
        self.write_record(&record)?;

        if now_completed && !was_completed {
            self.append_ledger(family)?;
        }
        Ok(())
    }

    fn read_record(&self) -> ProgressRecord {
        let path = self.progress_path.as_std_path();
        if !path.exists() {
            return ProgressRecord::default();
        }
        let parsed = fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|content| {
                serde_json::from_str::<ProgressRecord>(&content).map_err(|err| err.to_string())
            });
        match parsed {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    "could not load progress data from {}: {err}; starting fresh",
                    self.progress_path
                );
                ProgressRecord::default()
            }
        }
    }

    fn read_ledger(&self) -> HashSet<String> {
        let path = self.ledger_path.as_std_path();
        if !path.exists() {
            return HashSet::new();
        }
        match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(err) => {
                tracing::warn!("could not load completed TFs from {}: {err}", self.ledger_path);
                HashSet::new()
            }
        }
    }

    fn write_record(&self, record: &ProgressRecord) -> Result<(), HarvestError> {
        Store::write_json_atomic(&self.progress_path, record)
    }

    fn append_ledger(&self, name: &str) -> Result<(), HarvestError> {
        if self.read_ledger().contains(name) {
            return Ok(());
        }
        Store::append_line(&self.ledger_path, name)
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
