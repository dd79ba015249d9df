//! Per-item crawl state machine.
//!
//! Each work item moves `Discovered -> Attempting` and ends in exactly one of
//! `Completed`, `NoExport` or `Failed`. Errors never escape [`CrawlMachine::run`];
//! they become a `Failed` outcome with the error text as detail.

use std::fmt;
use std::fs;
use std::thread;

use crate::artifact::{ArtifactStore, SavedArtifact};
use crate::browser::BrowserSession;
use crate::config::CrawlTiming;
use crate::domain::{WorkItem, WorkItemStatus};
use crate::download::DropDir;
use crate::error::HarvestError;
use crate::resolver::{download_resolvers, resolve_first};

/// Markers that must all be on a report page for it to offer an export.
pub const REQUIRED_MARKERS: &[&str] = &["Export data", "csrfmiddlewaretoken"];
/// Logged for diagnosis only.
pub const INFO_MARKERS: &[&str] = &["PSFM", "Download PSFM", "site_id"];

const EXPORT_TAB: &str = "Export data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Discovered,
    Attempting,
    Completed,
    NoExport,
    Failed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemState::Discovered | ItemState::Attempting)
    }

    /// Persisted status for terminal states.
    pub fn status(self) -> Option<WorkItemStatus> {
        match self {
            ItemState::Completed => Some(WorkItemStatus::Completed),
            ItemState::NoExport => Some(WorkItemStatus::NoExport),
            ItemState::Failed => Some(WorkItemStatus::Failed),
            ItemState::Discovered | ItemState::Attempting => None,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Discovered => write!(f, "discovered"),
            ItemState::Attempting => write!(f, "attempting"),
            ItemState::Completed => write!(f, "completed"),
            ItemState::NoExport => write!(f, "no_export"),
            ItemState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub state: ItemState,
    pub detail: Option<String>,
    pub artifact: Option<SavedArtifact>,
}

impl ItemOutcome {
    fn completed(artifact: SavedArtifact) -> Self {
        Self {
            state: ItemState::Completed,
            detail: Some(format!("saved {}", artifact.filename)),
            artifact: Some(artifact),
        }
    }

    fn no_export(detail: impl Into<String>) -> Self {
        Self {
            state: ItemState::NoExport,
            detail: Some(detail.into()),
            artifact: None,
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            state: ItemState::Failed,
            detail: Some(detail.into()),
            artifact: None,
        }
    }

    pub fn status(&self) -> WorkItemStatus {
        self.state.status().unwrap_or(WorkItemStatus::Failed)
    }
}

pub struct CrawlMachine<'a> {
    timing: &'a CrawlTiming,
    min_content_length: usize,
    artifacts: &'a ArtifactStore,
    drop_dir: &'a DropDir,
}

impl<'a> CrawlMachine<'a> {
    pub fn new(
        timing: &'a CrawlTiming,
        min_content_length: usize,
        artifacts: &'a ArtifactStore,
        drop_dir: &'a DropDir,
    ) -> Self {
        Self {
            timing,
            min_content_length,
            artifacts,
            drop_dir,
        }
    }

    pub fn run(&self, session: &mut dyn BrowserSession, item: &WorkItem) -> ItemOutcome {
        let key = item.key();
        let mut state = ItemState::Discovered;
        advance(&key, &mut state, ItemState::Attempting);

        let outcome = match self.attempt(session, item) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("error processing motif report {}: {err}", item.label());
                ItemOutcome::failed(err.to_string())
            }
        };
        advance(&key, &mut state, outcome.state);
        outcome
    }

    fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        item: &WorkItem,
    ) -> Result<ItemOutcome, HarvestError> {
        tracing::info!("navigating to motif report for {}", item.label());
        session.navigate(&item.report_url)?;
        settle(self.timing.page_settle);

        if !self.has_export(session)? {
            tracing::warn!("motif page lacks export functionality");
            return Ok(ItemOutcome::no_export("no export functionality"));
        }

        self.open_export_tab(session);

        let resolvers = download_resolvers();
        let Some((strategy, control)) = resolve_first(session, &resolvers) else {
            tracing::warn!("no PSFM download control found");
            return Ok(ItemOutcome::failed("no PSFM download control found"));
        };
        tracing::info!("found PSFM download control via {strategy}");

        let stale = self.drop_dir.clear_stale();
        if stale > 0 {
            tracing::debug!("removed {stale} stale files from the download directory");
        }
        session.click(control)?;

        let Some(downloaded) = self
            .drop_dir
            .wait_for_artifact(self.timing.poll_interval, self.timing.download_timeout)?
        else {
            return Err(HarvestError::DownloadTimeout {
                secs: self.timing.download_timeout.as_secs_f64(),
            });
        };
        tracing::info!("download completed: {downloaded}");

        let content = fs::read_to_string(downloaded.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("read {downloaded}: {err}")))?;
        if let Err(err) = fs::remove_file(downloaded.as_std_path()) {
            tracing::debug!("could not remove {downloaded} from the download directory: {err}");
        }
        let content = content.trim();
        let len = content.chars().count();
        if len <= self.min_content_length {
            return Err(HarvestError::EmptyArtifact { len });
        }

        let source_url = session.current_url();
        let artifact = self.artifacts.save(item, content, source_url.as_deref())?;
        Ok(ItemOutcome::completed(artifact))
    }

    fn has_export(&self, session: &mut dyn BrowserSession) -> Result<bool, HarvestError> {
        let markers: Vec<&str> = REQUIRED_MARKERS
            .iter()
            .chain(INFO_MARKERS.iter())
            .copied()
            .collect();
        let present = session.page_markers(&markers)?;
        for (marker, found) in &present {
            tracing::debug!("export marker {marker}: {}", if *found { "yes" } else { "no" });
        }
        Ok(REQUIRED_MARKERS
            .iter()
            .all(|marker| present.get(*marker).copied().unwrap_or(false)))
    }

    /// Activates the export tab when there is one; otherwise the export form is
    /// assumed to be visible already.
    fn open_export_tab(&self, session: &mut dyn BrowserSession) {
        let tab = session
            .find_links(&|text| text.contains(EXPORT_TAB))
            .ok()
            .and_then(|links| links.into_iter().next());
        match tab {
            Some(tab) => {
                tracing::info!("found 'Export data' tab, clicking");
                if let Err(err) = session.click(tab.element) {
                    tracing::debug!("export tab click failed: {err}");
                }
                settle(self.timing.export_settle);
            }
            None => tracing::info!("no 'Export data' tab, assuming export form is visible"),
        }
    }
}

fn advance(key: &crate::domain::WorkItemKey, state: &mut ItemState, next: ItemState) {
    tracing::debug!("{key}: {state} -> {next}");
    *state = next;
}

fn settle(delay: std::time::Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ItemState::Discovered.is_terminal());
        assert!(!ItemState::Attempting.is_terminal());
        assert!(ItemState::Completed.is_terminal());
        assert!(ItemState::NoExport.is_terminal());
        assert!(ItemState::Failed.is_terminal());
    }

    #[test]
    fn terminal_states_map_to_statuses() {
        assert_eq!(ItemState::Completed.status(), Some(WorkItemStatus::Completed));
        assert_eq!(ItemState::NoExport.status(), Some(WorkItemStatus::NoExport));
        assert_eq!(ItemState::Failed.status(), Some(WorkItemStatus::Failed));
        assert_eq!(ItemState::Attempting.status(), None);
    }
}
