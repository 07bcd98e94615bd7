use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::check::{Assertion, Extraction};
use crate::runner::{Error, Result};
use crate::scope::Variables;
use volley_value::Value;

/// One request declaration. String fields may contain template tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub name: Arc<str>,
    /// Protocol identifier as written (`http`, `MQTT`, ...). Normalized by the registry.
    pub protocol: String,
    pub endpoint: String,
    /// HTTP method, SOAP action, MQTT/socket operation. Executors pick their own default when empty.
    pub method: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    /// Overrides stacked on top of every other layer for this request only.
    pub variables: Variables,
    /// Name of the data file feeding this request. `None` means all declared files.
    pub data_source: Option<String>,
    pub assertions: Vec<Assertion>,
    pub extract: Vec<Extraction>,
    /// Overrides the runner's default request timeout.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(
        name: impl Into<Arc<str>>,
        protocol: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            endpoint: endpoint.into(),
            method: String::new(),
            body: None,
            headers: Vec::new(),
            params: Vec::new(),
            variables: Variables::default(),
            data_source: None,
            assertions: Vec::new(),
            extract: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = Some(name.into());
        self
    }

    #[must_use]
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    #[must_use]
    pub fn extract(mut self, extraction: Extraction) -> Self {
        self.extract.push(extraction);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 100.0;

/// How hard and how long a scenario is driven.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionProfile {
    pub threads: u64,
    pub iterations: u64,
    pub ramp_up_seconds: u64,
    pub hold_seconds: u64,
    /// Minimum success rate, in percent, for the scenario to pass.
    pub success_threshold: f64,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            threads: 1,
            iterations: 1,
            ramp_up_seconds: 0,
            hold_seconds: 0,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

impl ExecutionProfile {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidThreads);
        }
        if self.iterations == 0 {
            return Err(Error::InvalidIterations);
        }
        if !(0.0..=100.0).contains(&self.success_threshold) {
            return Err(Error::InvalidThreshold(self.success_threshold));
        }
        Ok(())
    }

    pub fn ramp_up(&self) -> Duration {
        Duration::from_secs(self.ramp_up_seconds)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_seconds)
    }
}

/// A CSV file whose rows feed passes, one row per iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub name: String,
    pub path: PathBuf,
}

impl DataFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub requests: Vec<Request>,
    pub profile: ExecutionProfile,
    pub variables: Variables,
    pub data_files: Vec<DataFile>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            requests: Vec::new(),
            profile: ExecutionProfile::default(),
            variables: Variables::default(),
            data_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn request(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    #[must_use]
    pub fn profile(mut self, profile: ExecutionProfile) -> Self {
        self.profile = profile;
        self
    }

    #[must_use]
    pub fn threads(mut self, threads: u64) -> Self {
        self.profile.threads = threads;
        self
    }

    #[must_use]
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.profile.iterations = iterations;
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn data_file(mut self, file: DataFile) -> Self {
        self.data_files.push(file);
        self
    }

    /// Checks that need no I/O: profile bounds, at least one request, known
    /// protocols and declared data sources.
    pub fn validate(&self) -> Result<()> {
        self.profile.validate()?;
        if self.requests.is_empty() {
            return Err(Error::NoRequests);
        }
        for request in &self.requests {
            crate::protocol::ProtocolRegistry::parse(&request.protocol).map_err(|source| {
                Error::Protocol {
                    request: request.name.to_string(),
                    source,
                }
            })?;
            if let Some(name) = &request.data_source
                && !self.data_files.iter().any(|f| f.name == *name)
            {
                return Err(Error::UnknownDataSource {
                    request: request.name.to_string(),
                    data_source: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Everything one run executes, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioSet {
    pub variables: Variables,
    pub scenarios: Vec<Scenario>,
}

impl ScenarioSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }
}
