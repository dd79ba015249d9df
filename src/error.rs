use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("browser request failed: {0}")]
    BrowserHttp(String),

    #[error("browser request to {url} returned status {status}")]
    BrowserStatus { url: String, status: u16 },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("no page loaded in browser session")]
    NoPage,

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("element cannot be activated: {0}")]
    ElementNotInteractable(String),

    #[error("no download completed within {secs:.1}s")]
    DownloadTimeout { secs: f64 },

    #[error("downloaded artifact too short ({len} chars)")]
    EmptyArtifact { len: usize },

    #[error("family listing unreachable: {0}")]
    ListingUnreachable(String),

    #[error("lost navigation inside family {family}: {message}")]
    FamilyNavigation { family: String, message: String },

    #[error("family {0} still has unfinished motif reports")]
    IncompleteFamily(String),

    #[error("failed to install interrupt handler: {0}")]
    InterruptHandler(String),
}
