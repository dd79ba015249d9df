//! Ordered element lookup: strategies are tried in priority order and the first
//! one that yields an element wins.

use crate::browser::{BrowserSession, ElementHandle};
use crate::error::HarvestError;

type Strategy<'a> =
    Box<dyn Fn(&mut dyn BrowserSession) -> Result<Option<ElementHandle>, HarvestError> + 'a>;

pub struct Resolver<'a> {
    pub name: &'static str,
    strategy: Strategy<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new<F>(name: &'static str, strategy: F) -> Self
    where
        F: Fn(&mut dyn BrowserSession) -> Result<Option<ElementHandle>, HarvestError> + 'a,
    {
        Self {
            name,
            strategy: Box::new(strategy),
        }
    }
}

/// Runs `resolvers` in order. A strategy that errors counts as a miss.
pub fn resolve_first(
    session: &mut dyn BrowserSession,
    resolvers: &[Resolver<'_>],
) -> Option<(&'static str, ElementHandle)> {
    for resolver in resolvers {
        match (resolver.strategy)(session) {
            Ok(Some(element)) => return Some((resolver.name, element)),
            Ok(None) => tracing::debug!("resolver '{}' found nothing", resolver.name),
            Err(err) => tracing::debug!("resolver '{}' failed: {err}", resolver.name),
        }
    }
    None
}

/// Exact text, then substring, then a case-insensitive scan of every link.
pub fn link_text_resolvers(text: &str) -> Vec<Resolver<'_>> {
    vec![
        Resolver::new("exact link text", move |session| {
            first_link(session, &|candidate| candidate == text)
        }),
        Resolver::new("partial link text", move |session| {
            first_link(session, &|candidate| candidate.contains(text))
        }),
        Resolver::new("link scan", move |session| {
            let wanted = text.trim().to_lowercase();
            first_link(session, &|candidate| candidate.trim().to_lowercase() == wanted)
        }),
    ]
}

/// Labels of the PSFM download control, most specific first.
pub const DOWNLOAD_LABELS: &[&str] = &["Download PSFM (raw-FASTA)", "Download PSFM"];

/// Table cell texts that describe the PSFM export row, most specific first.
pub const DOWNLOAD_CELL_TEXTS: &[&str] = &[
    "Download Position-Specific-Frequency-Matrix of the motif in raw FASTA format",
    "raw FASTA format",
];

pub fn download_resolvers() -> Vec<Resolver<'static>> {
    vec![
        Resolver::new("exact download label", |session| {
            for label in DOWNLOAD_LABELS {
                if let Some(element) = first_link(session, &|candidate| candidate == *label)? {
                    return Ok(Some(element));
                }
            }
            Ok(None)
        }),
        Resolver::new("partial download label", |session| {
            for label in DOWNLOAD_LABELS {
                if let Some(element) = first_link(session, &|candidate| candidate.contains(label))? {
                    return Ok(Some(element));
                }
            }
            Ok(None)
        }),
        Resolver::new("export table cell", |session| {
            for text in DOWNLOAD_CELL_TEXTS {
                let cells = session.find_cells(&|candidate| candidate.contains(text))?;
                if let Some(cell) = cells.first() {
                    return Ok(Some(*cell));
                }
            }
            Ok(None)
        }),
    ]
}

fn first_link(
    session: &mut dyn BrowserSession,
    predicate: &dyn Fn(&str) -> bool,
) -> Result<Option<ElementHandle>, HarvestError> {
    Ok(session
        .find_links(predicate)?
        .into_iter()
        .next()
        .map(|link| link.element))
}
