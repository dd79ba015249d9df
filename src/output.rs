use crate::domain::WorkItemStatus;
use crate::harvest::{ProgressEvent, ProgressSink};
use crate::report::RunReport;

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::debug!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => tracing::debug!("{}", event.message),
        }
    }
}

pub fn print_run_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}PSFM harvest summary{reset}");
    println!("{green}downloaded: {}{reset}", report.downloaded());
    println!("{yellow}no export: {}{reset}", report.no_export());
    println!("{red}failed: {}{reset}", report.failed());
    if report.family_errors() > 0 {
        println!("{red}family errors: {}{reset}", report.family_errors());
    }

    for family in &report.families {
        let color = if family.error.is_some() { red } else { cyan };
        println!(
            "{color}  {}: {}/{} downloaded, {} no export, {} failed{reset}",
            family.family,
            family.count(WorkItemStatus::Completed),
            family.discovered,
            family.count(WorkItemStatus::NoExport),
            family.count(WorkItemStatus::Failed)
        );
        if let Some(error) = &family.error {
            println!("{red}    error: {error}{reset}");
        }
    }

    if report.interrupted {
        println!("{yellow}interrupted; rerun to resume{reset}");
    }
    if let Some(reason) = &report.halted {
        println!("{red}halted: {reason}{reset}");
    }
}
