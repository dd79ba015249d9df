//! Resume planning and run reporting. Everything here reads progress state and
//! never mutates it, except for appending the per-family results log.

use std::collections::HashSet;
use std::fmt::Write as _;

use camino::Utf8Path;
use serde::Serialize;

use crate::domain::{FamilyStatus, WorkItem, WorkItemStatus};
use crate::error::HarvestError;
use crate::progress::ProgressRecord;
use crate::store::Store;

const COMPLETED_SAMPLE: usize = 5;
const COMPLETED_LIST_MAX: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeSummary {
    pub total_families: usize,
    pub completed_families: usize,
    pub remaining_families: usize,
    pub motif_reports_total: usize,
    pub motif_reports_completed: usize,
    /// `Name (completed/known)` for families with partial progress.
    pub in_progress: Vec<String>,
    pub completed_names: Vec<String>,
}

impl ResumeSummary {
    /// `all_names` is the current discovery; pass an empty slice before the
    /// listing has been read and the totals fall back to the checkpoint.
    pub fn build(
        completed: &HashSet<String>,
        all_names: &[String],
        record: &ProgressRecord,
    ) -> Self {
        let (total_families, completed_families) = if all_names.is_empty() {
            let known: HashSet<&str> = record
                .families
                .keys()
                .map(String::as_str)
                .chain(completed.iter().map(String::as_str))
                .collect();
            (known.len(), completed.len())
        } else {
            let done = all_names
                .iter()
                .filter(|name| completed.contains(name.as_str()))
                .count();
            (all_names.len(), done)
        };

        let mut motif_reports_total = 0;
        let mut motif_reports_completed = 0;
        let mut in_progress = Vec::new();
        for (name, family) in &record.families {
            let reports = family.details.motif_reports.len();
            let done = family.completed_reports();
            motif_reports_total += reports;
            motif_reports_completed += done;
            if reports > 0 && family.status != FamilyStatus::Completed {
                in_progress.push(format!("{name} ({done}/{reports})"));
            }
        }

        let mut completed_names: Vec<String> = completed.iter().cloned().collect();
        completed_names.sort();

        Self {
            total_families,
            completed_families,
            remaining_families: total_families.saturating_sub(completed_families),
            motif_reports_total,
            motif_reports_completed,
            in_progress,
            completed_names,
        }
    }

    pub fn progress_pct(&self) -> f64 {
        if self.total_families == 0 {
            return 0.0;
        }
        self.completed_families as f64 / self.total_families as f64 * 100.0
    }

    /// Completed family names, sampled once there are more than ten.
    pub fn completed_line(&self) -> Option<String> {
        if self.completed_names.is_empty() {
            return None;
        }
        if self.completed_names.len() <= COMPLETED_LIST_MAX {
            return Some(format!("completed TFs: {}", self.completed_names.join(", ")));
        }
        Some(format!(
            "completed TFs (sample): {}... and {} more",
            self.completed_names[..COMPLETED_SAMPLE].join(", "),
            self.completed_names.len() - COMPLETED_SAMPLE
        ))
    }

    pub fn log(&self) {
        tracing::info!("resume summary:");
        tracing::info!("  total TF families: {}", self.total_families);
        tracing::info!("  already completed: {}", self.completed_families);
        tracing::info!("  remaining to process: {}", self.remaining_families);
        tracing::info!(
            "  progress: {}/{} ({:.1}%)",
            self.completed_families,
            self.total_families,
            self.progress_pct()
        );
        if self.motif_reports_total > 0 {
            tracing::info!(
                "  motif reports: {}/{} completed",
                self.motif_reports_completed,
                self.motif_reports_total
            );
        }
        if !self.in_progress.is_empty() {
            tracing::info!("  in progress: {}", self.in_progress.join(", "));
        }
        if let Some(line) = self.completed_line() {
            tracing::info!("  {line}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub individual_name: String,
    pub species_name: String,
    pub status: WorkItemStatus,
}

impl ItemResult {
    pub fn new(item: &WorkItem, status: WorkItemStatus) -> Self {
        Self {
            individual_name: item.individual_name.clone(),
            species_name: item.species_name.clone(),
            status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FamilyTally {
    pub family: String,
    pub discovered: usize,
    pub results: Vec<ItemResult>,
    pub error: Option<String>,
}

impl FamilyTally {
    pub fn new(family: &str) -> Self {
        Self {
            family: family.to_string(),
            ..Self::default()
        }
    }

    pub fn count(&self, status: WorkItemStatus) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == status)
            .count()
    }

    pub fn render(&self, date: &str) -> String {
        let rule = "=".repeat(80);
        let mut out = String::new();
        let _ = writeln!(out, "\n{rule}");
        let _ = writeln!(out, "TF FAMILY: {}", self.family);
        let _ = writeln!(out, "Date: {date}");
        let _ = writeln!(out, "{rule}");

        let sections = [
            ("SUCCESSFUL DOWNLOADS", WorkItemStatus::Completed),
            ("NO EXPORT FUNCTIONALITY", WorkItemStatus::NoExport),
            ("FAILED DOWNLOADS", WorkItemStatus::Failed),
        ];
        for (title, status) in sections {
            let entries: Vec<&ItemResult> = self
                .results
                .iter()
                .filter(|result| result.status == status)
                .collect();
            let _ = writeln!(out, "\n{title} ({}):", entries.len());
            if entries.is_empty() {
                let _ = writeln!(out, "  (none)");
            }
            for entry in entries {
                let _ = writeln!(
                    out,
                    "  * {} - {}",
                    entry.individual_name, entry.species_name
                );
            }
        }
        if let Some(error) = &self.error {
            let _ = writeln!(out, "\nFAMILY ERROR: {error}");
        }
        let _ = writeln!(
            out,
            "\nSUMMARY: {} successful, {} no export, {} failed",
            self.count(WorkItemStatus::Completed),
            self.count(WorkItemStatus::NoExport),
            self.count(WorkItemStatus::Failed)
        );
        let _ = writeln!(out, "TOTAL PROCESSED: {}", self.results.len());
        out
    }

    pub fn append_to_log(&self, path: &Utf8Path) -> Result<(), HarvestError> {
        let date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Store::append_text(path, &self.render(&date))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub families: Vec<FamilyTally>,
    pub interrupted: bool,
    pub halted: Option<String>,
}

impl RunReport {
    fn total(&self, status: WorkItemStatus) -> usize {
        self.families.iter().map(|family| family.count(status)).sum()
    }

    pub fn downloaded(&self) -> usize {
        self.total(WorkItemStatus::Completed)
    }

    pub fn no_export(&self) -> usize {
        self.total(WorkItemStatus::NoExport)
    }

    pub fn failed(&self) -> usize {
        self.total(WorkItemStatus::Failed)
    }

    pub fn family_errors(&self) -> usize {
        self.families
            .iter()
            .filter(|family| family.error.is_some())
            .count()
    }

    pub fn succeeded(&self) -> bool {
        self.downloaded() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{FamilyDetails, FamilyProgress, WorkItemProgress};

    fn tally() -> FamilyTally {
        let mut tally = FamilyTally::new("AraC/XylS");
        tally.results.push(ItemResult {
            individual_name: "AraC".to_string(),
            species_name: "Escherichia coli".to_string(),
            status: WorkItemStatus::Completed,
        });
        tally.results.push(ItemResult {
            individual_name: "XylS".to_string(),
            species_name: "Pseudomonas putida".to_string(),
            status: WorkItemStatus::NoExport,
        });
        tally
    }

    #[test]
    fn render_family_block() {
        let text = tally().render("2026-01-01 00:00:00");
        assert!(text.contains("TF FAMILY: AraC/XylS"));
        assert!(text.contains("SUCCESSFUL DOWNLOADS (1):\n  * AraC - Escherichia coli"));
        assert!(text.contains("FAILED DOWNLOADS (0):\n  (none)"));
        assert!(text.contains("SUMMARY: 1 successful, 1 no export, 0 failed"));
        assert!(text.contains("TOTAL PROCESSED: 2"));
    }

    fn report(status: WorkItemStatus) -> WorkItemProgress {
        WorkItemProgress {
            individual_name: "LexA".to_string(),
            species_name: "Escherichia coli".to_string(),
            family_numeric_id: 2,
            species_numeric_id: 1,
            status,
            last_attempt: None,
            detail: None,
        }
    }

    fn family(status: FamilyStatus, reports: &[WorkItemStatus]) -> FamilyProgress {
        FamilyProgress {
            status,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            details: FamilyDetails {
                motif_reports: reports
                    .iter()
                    .enumerate()
                    .map(|(index, status)| (format!("report#{index}"), report(*status)))
                    .collect(),
                error: None,
            },
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn summary_of_a_fresh_start_is_empty() {
        let summary = ResumeSummary::build(&HashSet::new(), &[], &ProgressRecord::default());
        assert_eq!(summary.total_families, 0);
        assert_eq!(summary.completed_families, 0);
        assert_eq!(summary.remaining_families, 0);
        assert_eq!(summary.motif_reports_total, 0);
        assert!(summary.in_progress.is_empty());
        assert_eq!(summary.progress_pct(), 0.0);
        assert_eq!(summary.completed_line(), None);
        summary.log();
    }

    #[test]
    fn summary_counts_partial_families() {
        let mut record = ProgressRecord::default();
        record.families.insert(
            "AraC/XylS".to_string(),
            family(
                FamilyStatus::Completed,
                &[WorkItemStatus::Completed, WorkItemStatus::Completed],
            ),
        );
        record.families.insert(
            "LexA".to_string(),
            family(
                FamilyStatus::InProgress,
                &[WorkItemStatus::Completed, WorkItemStatus::Pending],
            ),
        );
        let completed: HashSet<String> = names(&["AraC/XylS"]).into_iter().collect();

        let summary = ResumeSummary::build(
            &completed,
            &names(&["AraC/XylS", "LexA", "CRP", "LysR"]),
            &record,
        );

        assert_eq!(summary.total_families, 4);
        assert_eq!(summary.completed_families, 1);
        assert_eq!(summary.remaining_families, 3);
        assert_eq!(summary.motif_reports_total, 4);
        assert_eq!(summary.motif_reports_completed, 3);
        assert_eq!(summary.in_progress, names(&["LexA (1/2)"]));
        assert_eq!(summary.progress_pct(), 25.0);
        assert_eq!(
            summary.completed_line().as_deref(),
            Some("completed TFs: AraC/XylS")
        );

        let offline = ResumeSummary::build(&completed, &[], &record);
        assert_eq!(offline.total_families, 2);
        assert_eq!(offline.remaining_families, 1);
    }

    #[test]
    fn long_completed_lists_are_sampled() {
        let all: Vec<String> = (0..12).map(|index| format!("TF{index:02}")).collect();
        let completed: HashSet<String> = all.iter().cloned().collect();

        let summary = ResumeSummary::build(&completed, &all, &ProgressRecord::default());

        assert_eq!(summary.completed_families, 12);
        assert_eq!(summary.remaining_families, 0);
        assert_eq!(
            summary.completed_line().as_deref(),
            Some("completed TFs (sample): TF00, TF01, TF02, TF03, TF04... and 7 more")
        );
    }

    #[test]
    fn run_report_totals() {
        let report = RunReport {
            families: vec![tally(), FamilyTally::new("LexA")],
            ..RunReport::default()
        };
        assert_eq!(report.downloaded(), 1);
        assert_eq!(report.no_export(), 1);
        assert_eq!(report.failed(), 0);
        assert!(report.succeeded());
    }
}
