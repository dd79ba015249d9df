use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

pub const CONFIG_FILE: &str = "psfm-harvest.json";
pub const CONFIG_ENV: &str = "PSFM_HARVEST_CONFIG";

const DEFAULT_BASE_URL: &str = "http://www.collectf.org";
const DEFAULT_OUTPUT_DIR: &str = "data/tf_coevolution/collectf/selenium_psfms";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub timing: Option<TimingConfig>,
    #[serde(default)]
    pub min_content_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default)]
    pub page_settle_ms: Option<u64>,
    #[serde(default)]
    pub export_settle_ms: Option<u64>,
    #[serde(default)]
    pub back_settle_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Waits used by the crawl loop. All of them are plain sleeps or poll bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTiming {
    pub page_settle: Duration,
    pub export_settle: Duration,
    pub back_settle: Duration,
    pub poll_interval: Duration,
    pub download_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for CrawlTiming {
    fn default() -> Self {
        Self {
            page_settle: Duration::from_secs(3),
            export_settle: Duration::from_secs(8),
            back_settle: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            download_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl CrawlTiming {
    /// No settle delays and a short download window, for fakes and tests.
    pub fn immediate() -> Self {
        Self {
            page_settle: Duration::ZERO,
            export_settle: Duration::ZERO,
            back_settle: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            download_timeout: Duration::from_millis(50),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub output_dir: Utf8PathBuf,
    pub timing: CrawlTiming,
    pub min_content_length: usize,
}

impl ResolvedConfig {
    pub fn family_listing_url(&self) -> String {
        format!("{}/browse/browse_by_TF/", self.base_url)
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: Utf8PathBuf::from(DEFAULT_OUTPUT_DIR),
            timing: CrawlTiming::default(),
            min_content_length: 10,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config from `path`, the `PSFM_HARVEST_CONFIG` variable or
    /// `psfm-harvest.json` in the working directory, in that order. Only an
    /// explicitly named file is required to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let explicit = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok().filter(|v| !v.trim().is_empty()));
        let config_path = match &explicit {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if explicit.is_none() && !config_path.exists() {
            tracing::debug!("no {CONFIG_FILE} found, using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let defaults = ResolvedConfig::default();

        let base_url = config
            .base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HarvestError::InvalidConfig(format!(
                "base_url must be an http(s) URL: {base_url}"
            )));
        }

        let timing = resolve_timing(config.timing.unwrap_or_default(), defaults.timing);
        if timing.poll_interval.is_zero() {
            return Err(HarvestError::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if timing.download_timeout.is_zero() {
            return Err(HarvestError::InvalidConfig(
                "download_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            base_url,
            output_dir: config
                .output_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.output_dir),
            timing,
            min_content_length: config
                .min_content_length
                .unwrap_or(defaults.min_content_length),
        })
    }
}

fn resolve_timing(timing: TimingConfig, defaults: CrawlTiming) -> CrawlTiming {
    CrawlTiming {
        page_settle: timing
            .page_settle_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.page_settle),
        export_settle: timing
            .export_settle_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.export_settle),
        back_settle: timing
            .back_settle_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.back_settle),
        poll_interval: timing
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval),
        download_timeout: timing
            .download_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.download_timeout),
        request_timeout: timing
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.base_url, "http://www.collectf.org");
        assert_eq!(resolved.timing, CrawlTiming::default());
        assert_eq!(resolved.min_content_length, 10);
        assert_eq!(
            resolved.family_listing_url(),
            "http://www.collectf.org/browse/browse_by_TF/"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = Config {
            base_url: Some("https://mirror.example.org/".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.base_url, "https://mirror.example.org");
    }
}
