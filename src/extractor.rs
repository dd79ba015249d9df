use crate::browser::BrowserSession;
use crate::domain::{RawCandidate, ReportCandidate};
use crate::error::HarvestError;

/// Pulls raw discovery candidates off the page currently loaded in a session.
/// Filtering them into families and work items happens in `discovery`.
pub trait PageExtractor {
    fn family_candidates(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<RawCandidate>, HarvestError>;

    fn report_candidates(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<ReportCandidate>, HarvestError>;
}

/// Reads every link on the listing page and every "view" link on a family
/// page, together with the texts of its table row.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkExtractor;

impl PageExtractor for LinkExtractor {
    fn family_candidates(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<RawCandidate>, HarvestError> {
        let links = session.find_links(&|_| true)?;
        tracing::debug!("found {} links on the listing page", links.len());
        Ok(links
            .into_iter()
            .map(|link| RawCandidate::new(link.text, link.target_url))
            .collect())
    }

    fn report_candidates(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<ReportCandidate>, HarvestError> {
        let links = session.find_links(&|text| text.to_lowercase().contains("view"))?;
        let mut candidates = Vec::with_capacity(links.len());
        for link in links {
            let row_cells = session.row_cells(link.element).unwrap_or_else(|err| {
                tracing::debug!("no row context for '{}': {err}", link.text);
                Vec::new()
            });
            candidates.push(ReportCandidate {
                link_text: link.text,
                target_url: link.target_url,
                row_cells,
            });
        }
        Ok(candidates)
    }
}
