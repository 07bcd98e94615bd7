use serde::Serialize;
use std::io::Write as _;
use std::path::Path;

use volley_core::{RunReport, ScenarioResult, ScenarioSet};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _document: &Path, _set: &ScenarioSet) {}

    fn scenario_finished(&self, result: &ScenarioResult) {
        emit_json_line(&ScenarioLine {
            kind: "scenario",
            result,
        });
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(report));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ScenarioLine<'a> {
    kind: &'static str,
    #[serde(flatten)]
    result: &'a ScenarioResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub all_passed: bool,
    pub aborted: bool,
    pub scenarios: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let passed = report.passed();
    JsonSummaryLine {
        kind: "summary",
        all_passed: report.all_passed,
        aborted: report.aborted,
        scenarios: report.results.len(),
        passed,
        failed: report.results.len() - passed,
        errored: report.errored(),
        total_requests: report.results.iter().map(|r| r.metrics.total_requests).sum(),
        failed_requests: report.results.iter().map(|r| r.metrics.failure_count).sum(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
