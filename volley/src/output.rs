use crate::cli::OutputFormat;
use std::path::Path;

use volley_core::{RunReport, ScenarioResult, ScenarioSet};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, document: &Path, set: &ScenarioSet);
    fn scenario_finished(&self, result: &ScenarioResult);
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
