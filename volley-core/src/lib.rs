//! Scenario execution pipeline: variable resolution, protocol dispatch,
//! scenario runs and the controller that sequences them.

pub mod check;
pub mod data;
pub mod model;
pub mod protocol;
pub mod response;
pub mod runner;
pub mod scope;
pub mod template;

pub use check::{Assertion, Expected, Extraction};
pub use model::{DataFile, ExecutionProfile, Request, Scenario, ScenarioSet};
pub use protocol::{
    Connector, ConnectorReply, Exchange, ProtocolError, ProtocolExecutor, ProtocolKind,
    ProtocolRegistry, ResolvedRequest, UnsupportedProtocol,
};
pub use response::{ResponseContent, ResponsePath};
pub use runner::{
    AbortHandle, FailureKind, FailureReason, RunReport, RunnerConfig, ScenarioResult,
    ScenarioRunner, ScenarioState, TestExecutionController,
};
pub use scope::{PassScope, ScopeView, VariableScope, Variables};
pub use template::{Diagnostics, MissPolicy, Resolver, TemplateSyntax};
pub use volley_metrics::{MetricsAggregator, PercentileMode, RequestMetrics, RequestOutcome, RunMetrics};
pub use volley_value::{ObjectMap, Value};
