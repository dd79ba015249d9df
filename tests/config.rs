use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use psfm_harvest::config::{Config, ConfigLoader, CrawlTiming, TimingConfig};
use psfm_harvest::error::HarvestError;

#[test]
fn timing_overrides_are_partial() {
    let config = Config {
        timing: Some(TimingConfig {
            page_settle_ms: Some(250),
            download_timeout_secs: Some(90),
            ..TimingConfig::default()
        }),
        ..Config::default()
    };

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    let defaults = CrawlTiming::default();
    assert_eq!(resolved.timing.page_settle, Duration::from_millis(250));
    assert_eq!(resolved.timing.download_timeout, Duration::from_secs(90));
    assert_eq!(resolved.timing.export_settle, defaults.export_settle);
    assert_eq!(resolved.timing.poll_interval, defaults.poll_interval);
}

#[test]
fn rejects_non_http_base_url() {
    let config = Config {
        base_url: Some("ftp://collectf.org".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(_))
    );
}

#[test]
fn rejects_zero_poll_interval() {
    let config = Config {
        timing: Some(TimingConfig {
            poll_interval_ms: Some(0),
            ..TimingConfig::default()
        }),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HarvestError::InvalidConfig(message)) if message.contains("poll_interval_ms")
    );
}

#[test]
fn reads_explicit_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("psfm-harvest.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "base_url": "http://localhost:8000/",
            "output_dir": "out/psfms",
            "min_content_length": 20,
            "timing": { "poll_interval_ms": 100 }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.base_url, "http://localhost:8000");
    assert_eq!(resolved.output_dir.as_str(), "out/psfms");
    assert_eq!(resolved.min_content_length, 20);
    assert_eq!(resolved.timing.poll_interval, Duration::from_millis(100));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(HarvestError::ConfigRead(_))
    );
}

#[test]
fn malformed_file_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("psfm-harvest.json");
    fs::write(&path, "{ \"base_url\": ").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(HarvestError::ConfigParse(_))
    );
}
