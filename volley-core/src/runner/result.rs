use serde::Serialize;
use volley_metrics::RunMetrics;

use super::error::{Error, FailureKind};
use super::state::ScenarioState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&Error> for FailureReason {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Everything one scenario run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub name: String,
    pub description: String,
    /// `Completed` or `Failed`.
    pub state: ScenarioState,
    /// Completed, not aborted, and `successRatePercent >= successThreshold`.
    pub passed: bool,
    pub success_threshold: f64,
    pub metrics: RunMetrics,
    /// Set when the scenario stopped early on a configuration or fatal error.
    pub failure: Option<FailureReason>,
    /// The run was stopped from outside; `metrics` covers what finished.
    pub aborted: bool,
    /// Passes over the request list, hold-phase passes included.
    pub passes: u64,
    pub resolution_misses: u64,
    pub template_warnings: u64,
}

impl ScenarioResult {
    pub fn failed_threshold(&self) -> bool {
        !self.passed && self.failure.is_none()
    }
}

/// Results of a whole scenario set, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub results: Vec<ScenarioResult>,
    pub all_passed: bool,
    pub aborted: bool,
}

impl RunReport {
    pub fn new(results: Vec<ScenarioResult>, aborted: bool) -> Self {
        let all_passed = !aborted && results.iter().all(|r| r.passed);
        Self {
            results,
            all_passed,
            aborted,
        }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Scenarios that stopped on a configuration or fatal error.
    pub fn errored(&self) -> usize {
        self.results.iter().filter(|r| r.failure.is_some()).count()
    }
}
