pub mod artifact;
pub mod browser;
pub mod config;
pub mod crawl;
pub mod discovery;
pub mod domain;
pub mod download;
pub mod error;
pub mod extractor;
pub mod harvest;
pub mod output;
pub mod progress;
pub mod report;
pub mod resolver;
pub mod store;
