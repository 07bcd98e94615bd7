use std::time::Duration;

use volley_metrics::PercentileMode;

use crate::template::{MissPolicy, Resolver, TemplateSyntax};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for a whole run, handed to the controller when it is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    pub miss_policy: MissPolicy,
    pub template_syntax: TemplateSyntax,
    /// Applied to requests that do not set their own timeout.
    pub request_timeout: Duration,
    pub percentiles: PercentileMode,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            miss_policy: MissPolicy::default(),
            template_syntax: TemplateSyntax::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            percentiles: PercentileMode::default(),
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn miss_policy(mut self, policy: MissPolicy) -> Self {
        self.miss_policy = policy;
        self
    }

    #[must_use]
    pub fn template_syntax(mut self, syntax: TemplateSyntax) -> Self {
        self.template_syntax = syntax;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn percentiles(mut self, mode: PercentileMode) -> Self {
        self.percentiles = mode;
        self
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.template_syntax, self.miss_policy)
    }
}
