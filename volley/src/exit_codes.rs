#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more scenarios completed below their success threshold.
    ThresholdFailed = 10,

    /// A scenario stopped on a configuration or fatal error, or the run was interrupted.
    ScenarioError = 20,

    /// Invalid CLI flags or scenario document.
    InvalidInput = 30,

    /// Internal/runtime error (IO errors writing the report, signal setup, ...).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(report: &volley_core::RunReport) -> Self {
        if report.aborted || report.errored() > 0 {
            Self::ScenarioError
        } else if !report.all_passed {
            Self::ThresholdFailed
        } else {
            Self::Success
        }
    }
}
