use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use psfm_harvest::browser::{BrowserOptions, HttpBrowser};
use psfm_harvest::config::ConfigLoader;
use psfm_harvest::error::HarvestError;
use psfm_harvest::extractor::LinkExtractor;
use psfm_harvest::harvest::Harvester;
use psfm_harvest::output::{LogSink, print_run_summary};
use psfm_harvest::store::Store;

#[derive(Parser)]
#[command(name = "psfm-harvest")]
#[command(about = "Download PSFMs for every TF family listed on CollecTF, resuming where the last run stopped")]
#[command(version)]
struct Cli {
    /// Process at most this many families that are not yet completed.
    #[arg(long, value_name = "N")]
    max_families: Option<usize>,

    /// Run without a browser window (default).
    #[arg(long, conflicts_with = "visible")]
    headless: bool,

    /// Run with a visible browser window.
    #[arg(long)]
    visible: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> miette::Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let headless = cli.headless || !cli.visible;

    let config = ConfigLoader::resolve(None)?;
    let store = Store::new(config.output_dir.clone());
    store.ensure_layout()?;
    tracing::info!("output directory: {}", store.root());

    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; finishing the current motif report");
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| HarvestError::InterruptHandler(err.to_string()))?;

    let browser = HttpBrowser::new(BrowserOptions {
        headless,
        download_dir: store.download_dir(),
        request_timeout: config.timing.request_timeout,
    })?;
    let harvester =
        Harvester::new(browser, LinkExtractor, config, store).with_interrupt(interrupt);

    let report = harvester.run(cli.max_families, &LogSink)?;
    print_run_summary(&report);

    if !report.succeeded() {
        tracing::warn!("no PSFMs were downloaded in this run");
    }
    Ok(report.succeeded())
}
