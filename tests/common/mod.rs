#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;

use psfm_harvest::browser::{BrowserSession, ElementHandle, LinkInfo};
use psfm_harvest::config::{CrawlTiming, ResolvedConfig};
use psfm_harvest::error::HarvestError;
use psfm_harvest::harvest::{ProgressEvent, ProgressSink};
use psfm_harvest::store::Store;

pub const BASE: &str = "http://collectf.test";

pub fn listing_url() -> String {
    format!("{BASE}/browse/browse_by_TF/")
}

pub fn family_url(slug: &str) -> String {
    format!("{BASE}/browse/view_TF/{slug}/")
}

pub fn report_url(tf_id: u64, species_id: u64) -> String {
    format!("{BASE}/view_motif_reports_by_TF_and_species/{tf_id}/{species_id}/")
}

pub fn psfm_url(tf_id: u64, species_id: u64) -> String {
    format!("{BASE}/export/psfm/{tf_id}/{species_id}/")
}

pub fn psfm_content(label: &str) -> String {
    format!(">{label}\n0.25 0.25 0.25 0.25\n0.70 0.10 0.10 0.10\n")
}

#[derive(Debug, Clone)]
struct FakeLink {
    text: String,
    href: Option<String>,
    row: Option<usize>,
}

#[derive(Debug, Clone)]
struct FakeCell {
    text: String,
    row: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    links: Vec<FakeLink>,
    cells: Vec<FakeCell>,
    rows: Vec<Vec<String>>,
    markers: Vec<String>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(mut self, text: &str, href: &str) -> Self {
        self.links.push(FakeLink {
            text: text.to_string(),
            href: Some(href.to_string()),
            row: None,
        });
        self
    }

    /// A table row of plain cells followed by a cell holding a link.
    pub fn row(mut self, cells: &[&str], link_text: &str, href: &str) -> Self {
        let row = self.rows.len();
        let mut texts: Vec<String> = cells.iter().map(|cell| cell.to_string()).collect();
        texts.push(link_text.to_string());
        for text in &texts {
            self.cells.push(FakeCell {
                text: text.clone(),
                row,
            });
        }
        self.rows.push(texts);
        self.links.push(FakeLink {
            text: link_text.to_string(),
            href: Some(href.to_string()),
            row: Some(row),
        });
        self
    }

    pub fn marker(mut self, marker: &str) -> Self {
        self.markers.push(marker.to_string());
        self
    }

    /// A motif report page with a working PSFM export.
    pub fn exportable_report(self_url: &str, download: &str) -> Self {
        Self::new()
            .marker("Export data")
            .marker("csrfmiddlewaretoken")
            .marker("PSFM")
            .link("Export data", self_url)
            .link("Download PSFM (raw-FASTA)", download)
    }

    /// A motif report page without the export form.
    pub fn bare_report() -> Self {
        Self::new().marker("Motif report").link("Home", &format!("{BASE}/"))
    }
}

#[derive(Debug, Default)]
pub struct SiteLog {
    pub visits: Vec<String>,
    pub clicks: Vec<String>,
    pub downloads: usize,
    pub closed: bool,
}

/// In-memory stand-in for a browser session over a small fixed site.
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
    /// Download targets; `None` accepts the click but never delivers a file.
    downloads: HashMap<String, Option<String>>,
    drop_dir: Utf8PathBuf,
    current: Option<String>,
    history: Vec<String>,
    log: Rc<RefCell<SiteLog>>,
    interrupt_after: Option<(usize, Arc<AtomicBool>)>,
    /// Pages that start failing once this many downloads have been delivered.
    lost_after: HashMap<String, usize>,
}

impl FakeSite {
    pub fn new(drop_dir: Utf8PathBuf) -> Self {
        Self {
            pages: HashMap::new(),
            downloads: HashMap::new(),
            drop_dir,
            current: None,
            history: Vec::new(),
            log: Rc::new(RefCell::new(SiteLog::default())),
            interrupt_after: None,
            lost_after: HashMap::new(),
        }
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn download(mut self, url: &str, content: Option<&str>) -> Self {
        self.downloads
            .insert(url.to_string(), content.map(str::to_string));
        self
    }

    /// Raises `flag` once `count` downloads have been delivered.
    pub fn interrupt_after(mut self, count: usize, flag: Arc<AtomicBool>) -> Self {
        self.interrupt_after = Some((count, flag));
        self
    }

    /// Makes `url` unreachable once `downloads` files have been delivered.
    pub fn lose_page_after(mut self, url: &str, downloads: usize) -> Self {
        self.lost_after.insert(url.to_string(), downloads);
        self
    }

    pub fn log(&self) -> Rc<RefCell<SiteLog>> {
        Rc::clone(&self.log)
    }

    fn current_page(&self) -> Result<&FakePage, HarvestError> {
        let url = self.current.as_ref().ok_or(HarvestError::NoPage)?;
        self.pages.get(url).ok_or(HarvestError::NoPage)
    }

    fn load(&mut self, url: &str) -> Result<(), HarvestError> {
        if let Some(after) = self.lost_after.get(url) {
            if self.log.borrow().downloads >= *after {
                return Err(HarvestError::BrowserStatus {
                    url: url.to_string(),
                    status: 503,
                });
            }
        }
        if !self.pages.contains_key(url) {
            return Err(HarvestError::BrowserStatus {
                url: url.to_string(),
                status: 404,
            });
        }
        if let Some(previous) = self.current.replace(url.to_string()) {
            self.history.push(previous);
        }
        self.log.borrow_mut().visits.push(url.to_string());
        Ok(())
    }

    fn deliver(&mut self, href: &str) -> Result<(), HarvestError> {
        let Some(content) = self.downloads.get(href).cloned() else {
            return self.load(href);
        };
        let Some(content) = content else {
            return Ok(());
        };
        fs::create_dir_all(self.drop_dir.as_std_path()).unwrap();
        let mut log = self.log.borrow_mut();
        log.downloads += 1;
        let name = format!("psfm_{}.txt", log.downloads);
        fs::write(self.drop_dir.join(name).as_std_path(), content).unwrap();
        if let Some((count, flag)) = &self.interrupt_after {
            if log.downloads >= *count {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

impl BrowserSession for FakeSite {
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        self.load(url)
    }

    fn find_links(
        &mut self,
        predicate: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<LinkInfo>, HarvestError> {
        let page = self.current_page()?;
        Ok(page
            .links
            .iter()
            .enumerate()
            .filter(|(_, link)| predicate(&link.text))
            .map(|(index, link)| LinkInfo {
                text: link.text.clone(),
                target_url: link.href.clone(),
                element: ElementHandle(index),
            })
            .collect())
    }

    fn find_cells(
        &mut self,
        predicate: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        let page = self.current_page()?;
        let offset = page.links.len();
        Ok(page
            .cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| predicate(&cell.text))
            .map(|(index, _)| ElementHandle(offset + index))
            .collect())
    }

    fn row_cells(&mut self, element: ElementHandle) -> Result<Vec<String>, HarvestError> {
        let page = self.current_page()?;
        let row = match page.links.get(element.0) {
            Some(link) => link.row,
            None => page
                .cells
                .get(element.0 - page.links.len())
                .map(|cell| cell.row),
        };
        Ok(row
            .and_then(|row| page.rows.get(row))
            .cloned()
            .unwrap_or_default())
    }

    fn click(&mut self, element: ElementHandle) -> Result<(), HarvestError> {
        let page = self.current_page()?;
        let (text, href) = match page.links.get(element.0) {
            Some(link) => (link.text.clone(), link.href.clone()),
            None => {
                let cell = page
                    .cells
                    .get(element.0 - page.links.len())
                    .ok_or_else(|| HarvestError::ElementNotFound(format!("#{}", element.0)))?;
                let href = page
                    .links
                    .iter()
                    .find(|link| link.row == Some(cell.row))
                    .and_then(|link| link.href.clone());
                (cell.text.clone(), href)
            }
        };
        self.log.borrow_mut().clicks.push(text.clone());
        let href = href.ok_or(HarvestError::ElementNotInteractable(text))?;
        self.deliver(&href)
    }

    fn current_url(&self) -> Option<String> {
        self.current.clone()
    }

    fn page_markers(&mut self, markers: &[&str]) -> Result<BTreeMap<String, bool>, HarvestError> {
        let page = self.current_page()?;
        Ok(markers
            .iter()
            .map(|marker| {
                let found = page.markers.iter().any(|present| present.contains(marker));
                (marker.to_string(), found)
            })
            .collect())
    }

    fn go_back(&mut self) -> Result<(), HarvestError> {
        let previous = self.history.pop().ok_or(HarvestError::NoPage)?;
        self.current = Some(previous);
        Ok(())
    }

    fn close(&mut self) -> Result<(), HarvestError> {
        self.log.borrow_mut().closed = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: RefCell<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.borrow_mut().push(event.message);
    }
}

pub struct Workspace {
    pub temp: tempfile::TempDir,
    pub store: Store,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        store.ensure_layout().unwrap();
        Self { temp, store }
    }

    pub fn config(&self) -> ResolvedConfig {
        ResolvedConfig {
            base_url: BASE.to_string(),
            output_dir: self.store.root().to_path_buf(),
            timing: CrawlTiming::immediate(),
            ..ResolvedConfig::default()
        }
    }

    pub fn site(&self) -> FakeSite {
        FakeSite::new(self.store.download_dir())
    }

    pub fn matrices(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.store.matrices_dir().as_std_path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
