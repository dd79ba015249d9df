use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{Family, RawCandidate, ReportCandidate, WorkItem};
use crate::progress::FamilyProgress;

/// Link texts on the listing page that are site chrome, not TF families.
pub const STOP_WORDS: &[&str] = &[
    "browse",
    "search",
    "about",
    "home",
    "view",
    "more",
    "here",
    "feedback",
    "stats",
    "links",
    "cite",
    "contribute",
    "compare",
    "register",
    "login",
    "quick",
    "help",
    "contact",
];

pub const REPORT_PATH: &str = "view_motif_reports_by_TF_and_species";

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 20;
const MAX_INDIVIDUAL_CHARS: usize = 20;
const MIN_SPECIES_CHARS: usize = 5;
const UNKNOWN_SPECIES: &str = "Unknown";

static FAMILY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9/]{1,15}$").expect("family name pattern"));

static REPORT_IDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/view_motif_reports_by_TF_and_species/(\d+)/(\d+)/").expect("report id pattern")
});

/// Shape test for a TF family name as it appears in the listing.
pub fn is_family_name(text: &str) -> bool {
    let text = text.trim();
    let chars = text.chars().count();
    if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&chars) {
        return false;
    }
    let lower = text.to_lowercase();
    if STOP_WORDS.contains(&lower.as_str()) {
        return false;
    }
    FAMILY_NAME.is_match(text)
}

pub fn discover_families(candidates: &[RawCandidate]) -> Vec<Family> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|candidate| is_family_name(&candidate.text))
        .filter(|candidate| seen.insert(candidate.text.trim().to_string()))
        .map(|candidate| Family::new(candidate.text.trim(), candidate.target_url.clone()))
        .collect()
}

/// Names not yet completed, in discovery order.
pub fn remaining(all_names: &[String], completed: &HashSet<String>) -> Vec<String> {
    all_names
        .iter()
        .filter(|name| !completed.contains(name.as_str()))
        .cloned()
        .collect()
}

pub fn remaining_families(families: Vec<Family>, completed: &HashSet<String>) -> Vec<Family> {
    families
        .into_iter()
        .filter(|family| !completed.contains(&family.name))
        .collect()
}

/// Extracts the TF and species ids from a motif report URL.
pub fn parse_report_ids(url: &str) -> Option<(u64, u64)> {
    let captures = REPORT_IDS.captures(url)?;
    let tf_id = captures.get(1)?.as_str().parse().ok()?;
    let species_id = captures.get(2)?.as_str().parse().ok()?;
    Some((tf_id, species_id))
}

pub fn discover_work_items(family: &Family, candidates: &[ReportCandidate]) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for candidate in candidates {
        if !candidate.link_text.to_lowercase().contains("view") {
            continue;
        }
        let Some(url) = candidate.target_url.as_deref() else {
            continue;
        };
        if !url.contains(REPORT_PATH) {
            continue;
        }
        let Some((tf_id, species_id)) = parse_report_ids(url) else {
            tracing::debug!("discarding report link without ids: {url}");
            continue;
        };

        let individual_name = candidate
            .row_cells
            .first()
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty() && cell.chars().count() < MAX_INDIVIDUAL_CHARS)
            .unwrap_or(family.name.as_str())
            .to_string();
        let species_name = candidate
            .row_cells
            .get(1)
            .map(|cell| cell.trim())
            .filter(|cell| cell.chars().count() > MIN_SPECIES_CHARS)
            .unwrap_or(UNKNOWN_SPECIES)
            .to_string();

        let item = WorkItem {
            family_name: family.name.clone(),
            individual_name,
            species_name,
            family_numeric_id: tf_id,
            species_numeric_id: species_id,
            report_url: url.to_string(),
        };
        if seen.insert(item.key()) {
            items.push(item);
        }
    }

    items
}

/// Drops items whose recorded outcome is settled. Failed and unseen items stay.
pub fn remaining_work_items(
    items: Vec<WorkItem>,
    progress: Option<&FamilyProgress>,
) -> Vec<WorkItem> {
    let Some(progress) = progress else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| {
            progress
                .details
                .motif_reports
                .get(item.key().as_str())
                .map(|report| !report.status.is_settled())
                .unwrap_or(true)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_name_shape() {
        assert!(is_family_name("LexA"));
        assert!(is_family_name("AraC/XylS"));
        assert!(is_family_name(" CRP "));
        assert!(!is_family_name("A"));
        assert!(!is_family_name("Browse"));
        assert!(!is_family_name("HELP"));
        assert!(!is_family_name("9abc"));
        assert!(!is_family_name("Two words"));
        assert!(!is_family_name("ABCDEFGHIJKLMNOPQ"));
    }

    #[test]
    fn parse_ids_from_report_url() {
        assert_eq!(
            parse_report_ids("http://www.collectf.org/view_motif_reports_by_TF_and_species/31/7/"),
            Some((31, 7))
        );
        assert_eq!(
            parse_report_ids("http://www.collectf.org/view_motif_reports_by_TF_and_species/31/"),
            None
        );
    }
}
