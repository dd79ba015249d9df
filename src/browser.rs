//! Browser capability used by the crawl loop, plus a plain HTTP implementation.
//!
//! [`HttpBrowser`] renders nothing; it fetches pages, indexes their links and
//! table cells from the parsed document, and treats any non-HTML response to a
//! click as a file download landing in the drop directory.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};

use crate::download::PARTIAL_SUFFIX;
use crate::error::HarvestError;

const HISTORY_LIMIT: usize = 16;

/// Opaque reference to an element of the page currently loaded in a session.
/// Handles go stale on the next navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub text: String,
    pub target_url: Option<String>,
    pub element: ElementHandle,
}

pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError>;
    fn find_links(&mut self, predicate: &dyn Fn(&str) -> bool)
    -> Result<Vec<LinkInfo>, HarvestError>;
    fn find_cells(
        &mut self,
        predicate: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<ElementHandle>, HarvestError>;
    /// Texts of the table row containing `element`, empty when it is not in a row.
    fn row_cells(&mut self, element: ElementHandle) -> Result<Vec<String>, HarvestError>;
    fn click(&mut self, element: ElementHandle) -> Result<(), HarvestError>;
    fn current_url(&self) -> Option<String>;
    fn page_markers(&mut self, markers: &[&str]) -> Result<BTreeMap<String, bool>, HarvestError>;
    fn go_back(&mut self) -> Result<(), HarvestError>;
    fn close(&mut self) -> Result<(), HarvestError>;
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub download_dir: Utf8PathBuf,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
enum ElementKind {
    Link { href: Option<String> },
    Cell,
}

#[derive(Debug, Clone)]
struct PageElement {
    kind: ElementKind,
    text: String,
    row: Option<usize>,
}

#[derive(Debug, Clone)]
struct LoadedPage {
    url: Url,
    html: String,
    elements: Vec<PageElement>,
    rows: Vec<Vec<String>>,
}

pub struct HttpBrowser {
    client: Option<Client>,
    download_dir: Utf8PathBuf,
    page: Option<LoadedPage>,
    history: VecDeque<Url>,
}

impl HttpBrowser {
    pub fn new(options: BrowserOptions) -> Result<Self, HarvestError> {
        if !options.headless {
            tracing::info!("HTTP browser session has no window; --visible only affects logging");
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("psfm-harvest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::BrowserHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .build()
            .map_err(|err| HarvestError::BrowserHttp(err.to_string()))?;
        std::fs::create_dir_all(options.download_dir.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        tracing::info!("browser session initialized");
        Ok(Self {
            client: Some(client),
            download_dir: options.download_dir,
            page: None,
            history: VecDeque::new(),
        })
    }

    fn client(&self) -> Result<&Client, HarvestError> {
        self.client
            .as_ref()
            .ok_or_else(|| HarvestError::BrowserHttp("browser session already closed".to_string()))
    }

    fn page(&self) -> Result<&LoadedPage, HarvestError> {
        self.page.as_ref().ok_or(HarvestError::NoPage)
    }

    fn element(&self, handle: ElementHandle) -> Result<&PageElement, HarvestError> {
        self.page()?
            .elements
            .get(handle.0)
            .ok_or_else(|| HarvestError::ElementNotFound(format!("stale element #{}", handle.0)))
    }

    fn get_with_retries(&self, url: &Url) -> Result<Response, HarvestError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let client = self.client()?;
        let mut attempt = 0usize;
        loop {
            match client.get(url.clone()).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    if !resp.status().is_success() {
                        return Err(HarvestError::BrowserStatus {
                            url: url.to_string(),
                            status,
                        });
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(HarvestError::Navigation {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn load(&mut self, url: Url) -> Result<(), HarvestError> {
        let response = self.get_with_retries(&url)?;
        let final_url = response.url().clone();
        let html = response.text().map_err(|err| HarvestError::Navigation {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        self.page = Some(LoadedPage::parse(final_url, html));
        Ok(())
    }

    fn resolve(&self, href: &str) -> Result<Url, HarvestError> {
        match &self.page {
            Some(page) => page.url.join(href),
            None => Url::parse(href),
        }
        .map_err(|err| HarvestError::Navigation {
            url: href.to_string(),
            message: err.to_string(),
        })
    }

    fn follow(&mut self, href: &str) -> Result<(), HarvestError> {
        let url = self.resolve(href)?;
        let response = self.get_with_retries(&url)?;
        if is_download(response.headers()) {
            let name = download_name(response.headers(), response.url());
            save_download(response, &self.download_dir, &name)?;
            tracing::debug!("download intercepted: {name}");
            return Ok(());
        }
        let final_url = response.url().clone();
        let html = response.text().map_err(|err| HarvestError::Navigation {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        if let Some(previous) = self.page.as_ref().map(|page| page.url.clone()) {
            remember(&mut self.history, previous);
        }
        self.page = Some(LoadedPage::parse(final_url, html));
        Ok(())
    }
}

impl BrowserSession for HttpBrowser {
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        let target = self.resolve(url)?;
        let previous = self.page.as_ref().map(|page| page.url.clone());
        self.load(target)?;
        if let Some(previous) = previous {
            remember(&mut self.history, previous);
        }
        Ok(())
    }

    fn find_links(
        &mut self,
        predicate: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<LinkInfo>, HarvestError> {
        let page = self.page()?;
        Ok(page
            .elements
            .iter()
            .enumerate()
            .filter_map(|(index, element)| match &element.kind {
                ElementKind::Link { href } if predicate(&element.text) => Some(LinkInfo {
                    text: element.text.clone(),
                    target_url: href
                        .as_deref()
                        .and_then(|href| page.url.join(href).ok())
                        .map(|url| url.to_string()),
                    element: ElementHandle(index),
                }),
                _ => None,
            })
            .collect())
    }

    fn find_cells(
        &mut self,
        predicate: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<ElementHandle>, HarvestError> {
        Ok(self
            .page()?
            .elements
            .iter()
            .enumerate()
            .filter(|(_, element)| {
                matches!(element.kind, ElementKind::Cell) && predicate(&element.text)
            })
            .map(|(index, _)| ElementHandle(index))
            .collect())
    }

    fn row_cells(&mut self, element: ElementHandle) -> Result<Vec<String>, HarvestError> {
        let row = self.element(element)?.row;
        let page = self.page()?;
        Ok(row
            .and_then(|row| page.rows.get(row))
            .cloned()
            .unwrap_or_default())
    }

    fn click(&mut self, element: ElementHandle) -> Result<(), HarvestError> {
        let target = self.element(element)?.clone();
        let href = match target.kind {
            ElementKind::Link { href: Some(href) } => href,
            ElementKind::Link { href: None } => {
                return Err(HarvestError::ElementNotInteractable(target.text));
            }
            // A cell is clickable through the first link in its row.
            ElementKind::Cell => {
                let page = self.page()?;
                page.elements
                    .iter()
                    .find_map(|candidate| match &candidate.kind {
                        ElementKind::Link { href: Some(href) }
                            if candidate.row.is_some() && candidate.row == target.row =>
                        {
                            Some(href.clone())
                        }
                        _ => None,
                    })
                    .ok_or_else(|| HarvestError::ElementNotInteractable(target.text.clone()))?
            }
        };
        self.follow(&href)
    }

    fn current_url(&self) -> Option<String> {
        self.page.as_ref().map(|page| page.url.to_string())
    }

    fn page_markers(&mut self, markers: &[&str]) -> Result<BTreeMap<String, bool>, HarvestError> {
        let page = self.page()?;
        Ok(markers
            .iter()
            .map(|marker| (marker.to_string(), page.html.contains(marker)))
            .collect())
    }

    fn go_back(&mut self) -> Result<(), HarvestError> {
        let previous = self
            .history
            .pop_back()
            .ok_or_else(|| HarvestError::Navigation {
                url: self.current_url().unwrap_or_default(),
                message: "no previous page".to_string(),
            })?;
        self.load(previous)
    }

    fn close(&mut self) -> Result<(), HarvestError> {
        self.client = None;
        self.page = None;
        self.history.clear();
        Ok(())
    }
}

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("row selector"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("anchor selector"));

impl LoadedPage {
    fn parse(url: Url, html: String) -> Self {
        let document = Html::parse_document(&html);
        let mut elements = Vec::new();
        let mut rows = Vec::new();
        let mut row_index = HashMap::new();

        for row in document.select(&ROW) {
            let index = rows.len();
            row_index.insert(row.id(), index);
            let mut texts = Vec::new();
            // Direct cells only; a nested table's cells belong to its own rows.
            for cell in row.children().filter_map(ElementRef::wrap) {
                if !matches!(cell.value().name(), "td" | "th") {
                    continue;
                }
                let text = visible_text(&cell);
                elements.push(PageElement {
                    kind: ElementKind::Cell,
                    text: text.clone(),
                    row: Some(index),
                });
                texts.push(text);
            }
            rows.push(texts);
        }

        for anchor in document.select(&ANCHOR) {
            let row = anchor
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|ancestor| ancestor.value().name() == "tr")
                .and_then(|tr| row_index.get(&tr.id()).copied());
            elements.push(PageElement {
                kind: ElementKind::Link {
                    href: anchor.value().attr("href").map(|href| href.trim().to_string()),
                },
                text: visible_text(&anchor),
                row,
            });
        }

        Self {
            url,
            html,
            elements,
            rows,
        }
    }
}

fn visible_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pushes onto the back stack, dropping the oldest entry once it is full.
fn remember(history: &mut VecDeque<Url>, url: Url) {
    if history.len() >= HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(url);
}

fn is_download(headers: &HeaderMap) -> bool {
    let attachment = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("attachment"))
        .unwrap_or(false);
    let html = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("html"))
        .unwrap_or(true);
    attachment || !html
}

fn download_name(headers: &HeaderMap, url: &Url) -> String {
    let from_header = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split("filename=").nth(1))
        .map(|name| name.trim_matches(|c| c == '"' || c == '\'' || c == ';' || c == ' '))
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let from_url = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
        .map(str::to_string);
    let name = from_header
        .or(from_url)
        .unwrap_or_else(|| "download.txt".to_string());
    name.replace(['/', '\\'], "_")
}

fn save_download(mut response: Response, dir: &Utf8Path, name: &str) -> Result<(), HarvestError> {
    let final_path = dir.join(name);
    let partial_path = dir.join(format!("{name}{PARTIAL_SUFFIX}"));
    let mut file = File::create(partial_path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    std::io::copy(&mut response, &mut file)
        .map_err(|err| HarvestError::BrowserHttp(err.to_string()))?;
    drop(file);
    std::fs::rename(partial_path.as_std_path(), final_path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
