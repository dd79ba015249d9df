//! Top-level crawl loop: listing, families, motif reports.
//!
//! Every work item outcome is checkpointed as soon as it is known, so a run
//! that dies mid-family resumes at the first unsettled item.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::artifact::ArtifactStore;
use crate::browser::BrowserSession;
use crate::config::ResolvedConfig;
use crate::crawl::CrawlMachine;
use crate::discovery::{discover_families, discover_work_items, remaining_families, remaining_work_items};
use crate::domain::{Family, FamilyStatus};
use crate::download::DropDir;
use crate::error::HarvestError;
use crate::extractor::PageExtractor;
use crate::progress::{FamilyProgress, ProgressStore};
use crate::report::{FamilyTally, ItemResult, ResumeSummary, RunReport};
use crate::resolver::{link_text_resolvers, resolve_first};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Owns the browser session and closes it exactly once, on [`release`] or
/// on drop, whichever comes first.
///
/// [`release`]: SessionGuard::release
pub struct SessionGuard<B: BrowserSession> {
    session: B,
    released: bool,
}

impl<B: BrowserSession> SessionGuard<B> {
    pub fn new(session: B) -> Self {
        Self {
            session,
            released: false,
        }
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.session.close() {
            Ok(()) => tracing::info!("browser session closed"),
            Err(err) => tracing::warn!("failed to close browser session: {err}"),
        }
    }
}

impl<B: BrowserSession> Deref for SessionGuard<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.session
    }
}

impl<B: BrowserSession> DerefMut for SessionGuard<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.session
    }
}

impl<B: BrowserSession> Drop for SessionGuard<B> {
    fn drop(&mut self) {
        self.release();
    }
}

enum FamilyFlow {
    Finished,
    Interrupted,
}

pub struct Harvester<B: BrowserSession, E: PageExtractor> {
    session: SessionGuard<B>,
    extractor: E,
    config: ResolvedConfig,
    store: Store,
    progress: ProgressStore,
    artifacts: ArtifactStore,
    drop_dir: DropDir,
    interrupt: Arc<AtomicBool>,
}

impl<B: BrowserSession, E: PageExtractor> Harvester<B, E> {
    pub fn new(session: B, extractor: E, config: ResolvedConfig, store: Store) -> Self {
        Self {
            session: SessionGuard::new(session),
            extractor,
            progress: ProgressStore::new(&store),
            artifacts: ArtifactStore::new(&store),
            drop_dir: DropDir::new(store.download_dir()),
            config,
            store,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an externally owned interrupt flag, e.g. one set by a signal handler.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn run(
        mut self,
        max_families: Option<usize>,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, HarvestError> {
        let started = Instant::now();
        let loaded = self.progress.load();
        let listing = self.config.family_listing_url();

        sink.event(ProgressEvent {
            message: format!("phase=Discover; loading {listing}"),
            elapsed: None,
        });
        self.session
            .navigate(&listing)
            .map_err(|err| HarvestError::ListingUnreachable(err.to_string()))?;
        settle(self.config.timing.page_settle);

        let candidates = self
            .extractor
            .family_candidates(&mut *self.session)
            .map_err(|err| HarvestError::ListingUnreachable(err.to_string()))?;
        let families = discover_families(&candidates);
        tracing::info!("found {} TF families", families.len());

        let names: Vec<String> = families.iter().map(|family| family.name.clone()).collect();
        ResumeSummary::build(&loaded.completed, &names, &loaded.record).log();

        let mut pending = remaining_families(families, &loaded.completed);
        if let Some(max) = max_families {
            pending.truncate(max);
        }
        if pending.is_empty() {
            tracing::info!("all TF families already completed");
        }

        let mut report = RunReport::default();
        let total = pending.len();
        for (index, family) in pending.iter().enumerate() {
            if self.interrupted() {
                report.interrupted = true;
                break;
            }
            tracing::info!("processing TF family {}/{}: {}", index + 1, total, family.name);
            sink.event(ProgressEvent {
                message: format!("phase=Family; {}/{} {}", index + 1, total, family.name),
                elapsed: Some(started.elapsed()),
            });

            let (tally, flow) = self.process_family(family, loaded.record.family(&family.name), sink);
            if let Err(err) = tally.append_to_log(&self.store.family_log_path()) {
                tracing::warn!("failed to write family results log: {err}");
            }
            report.families.push(tally);

            if matches!(flow, FamilyFlow::Interrupted) {
                report.interrupted = true;
                break;
            }

            if let Err(err) = self.session.navigate(&listing) {
                tracing::error!("cannot return to the family listing, stopping: {err}");
                report.halted = Some(err.to_string());
                break;
            }
            settle(self.config.timing.back_settle);
        }

        if report.interrupted {
            tracing::warn!("interrupted; progress has been saved");
        }
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {} downloaded, {} no export, {} failed",
                report.downloaded(),
                report.no_export(),
                report.failed()
            ),
            elapsed: Some(started.elapsed()),
        });
        self.session.release();
        Ok(report)
    }

    fn process_family(
        &mut self,
        family: &Family,
        snapshot: Option<&FamilyProgress>,
        sink: &dyn ProgressSink,
    ) -> (FamilyTally, FamilyFlow) {
        let mut tally = FamilyTally::new(&family.name);
        if let Err(err) =
            self.progress
                .record_family_outcome(&family.name, FamilyStatus::InProgress, None)
        {
            tracing::error!("failed to checkpoint TF family {}: {err}", family.name);
        }

        match self.crawl_family(family, snapshot, &mut tally, sink) {
            Ok(flow) => (tally, flow),
            Err(err) => {
                tracing::error!("error processing TF family {}: {err}", family.name);
                let message = err.to_string();
                if let Err(err) = self.progress.record_family_outcome(
                    &family.name,
                    FamilyStatus::Error,
                    Some(message.clone()),
                ) {
                    tracing::error!("failed to checkpoint TF family {}: {err}", family.name);
                }
                tally.error = Some(message);
                (tally, FamilyFlow::Finished)
            }
        }
    }

    fn crawl_family(
        &mut self,
        family: &Family,
        snapshot: Option<&FamilyProgress>,
        tally: &mut FamilyTally,
        sink: &dyn ProgressSink,
    ) -> Result<FamilyFlow, HarvestError> {
        self.open_family(family)?;
        let family_url = self
            .session
            .current_url()
            .or_else(|| family.target_url.clone())
            .ok_or_else(|| HarvestError::FamilyNavigation {
                family: family.name.clone(),
                message: "family page has no URL".to_string(),
            })?;

        let candidates = self.extractor.report_candidates(&mut *self.session)?;
        let items = discover_work_items(family, &candidates);
        tally.discovered = items.len();
        if items.is_empty() {
            tracing::warn!("no motif reports found for TF family {}", family.name);
            return Ok(FamilyFlow::Finished);
        }
        tracing::info!("found {} motif reports for {}", items.len(), family.name);
        if let Err(err) = self.progress.record_discovered_items(&family.name, &items) {
            tracing::error!("failed to checkpoint discovered reports for {}: {err}", family.name);
        }

        let pending = remaining_work_items(items, snapshot);
        let settled = tally.discovered - pending.len();
        if settled > 0 {
            tracing::info!("skipping {settled} already settled motif reports");
        }

        let machine = CrawlMachine::new(
            &self.config.timing,
            self.config.min_content_length,
            &self.artifacts,
            &self.drop_dir,
        );
        let total = pending.len();
        for (index, item) in pending.iter().enumerate() {
            if self.interrupt.load(Ordering::SeqCst) {
                return Ok(FamilyFlow::Interrupted);
            }
            tracing::info!("processing motif report {}/{}: {}", index + 1, total, item.label());
            let started = Instant::now();
            let outcome = machine.run(&mut *self.session, item);
            let status = outcome.status();

            if let Err(err) = self.progress.record_work_item_outcome(
                &family.name,
                item,
                status,
                outcome.detail.clone(),
            ) {
                tracing::error!("failed to checkpoint {}: {err}", item.label());
            }
            tally.results.push(ItemResult::new(item, status));
            sink.event(ProgressEvent {
                message: format!("phase=Item; {} {status}", item.label()),
                elapsed: Some(started.elapsed()),
            });

            return_to_family(
                &mut *self.session,
                &family.name,
                &family_url,
                self.config.timing.back_settle,
            )?;
        }
        Ok(FamilyFlow::Finished)
    }

    /// Opens the family page from the listing by clicking its link, falling
    /// back to the link target discovered earlier.
    fn open_family(&mut self, family: &Family) -> Result<(), HarvestError> {
        let resolvers = link_text_resolvers(&family.name);
        match resolve_first(&mut *self.session, &resolvers) {
            Some((strategy, link)) => {
                tracing::debug!("family link for {} found via {strategy}", family.name);
                self.session.click(link)?;
            }
            None => {
                let url = family.target_url.as_deref().ok_or_else(|| {
                    HarvestError::ElementNotFound(format!("link for TF family {}", family.name))
                })?;
                self.session.navigate(url)?;
            }
        }
        settle(self.config.timing.page_settle);
        Ok(())
    }
}

fn return_to_family(
    session: &mut dyn BrowserSession,
    family: &str,
    family_url: &str,
    back_settle: Duration,
) -> Result<(), HarvestError> {
    if session.go_back().is_ok() && session.current_url().as_deref() == Some(family_url) {
        settle(back_settle);
        return Ok(());
    }
    session
        .navigate(family_url)
        .map_err(|err| HarvestError::FamilyNavigation {
            family: family.to_string(),
            message: err.to_string(),
        })?;
    settle(back_settle);
    Ok(())
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
