use std::sync::Arc;

use super::config::RunnerConfig;
use super::result::{RunReport, ScenarioResult};
use super::scenario::ScenarioRunner;
use super::signal::AbortHandle;
use crate::model::ScenarioSet;
use crate::protocol::ProtocolRegistry;

/// Runs the scenarios of a set one after another, sharing the protocol
/// registry and the global variables between them.
///
/// [`abort_handle`](Self::abort_handle) stops the scenario in progress and
/// every one after it.
#[derive(Debug)]
pub struct TestExecutionController {
    config: RunnerConfig,
    registry: Arc<ProtocolRegistry>,
    abort: AbortHandle,
}

impl TestExecutionController {
    pub fn new(config: RunnerConfig, registry: Arc<ProtocolRegistry>) -> Self {
        Self {
            config,
            registry,
            abort: AbortHandle::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub async fn run(&self, set: &ScenarioSet) -> RunReport {
        self.run_with(set, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_result` as each scenario finishes.
    pub async fn run_with<F>(&self, set: &ScenarioSet, mut on_result: F) -> RunReport
    where
        F: FnMut(&ScenarioResult),
    {
        let globals = Arc::new(set.variables.clone());
        let mut results = Vec::with_capacity(set.scenarios.len());

        for (idx, scenario) in set.scenarios.iter().enumerate() {
            if self.abort.is_aborted() {
                tracing::warn!(
                    skipped = set.scenarios.len() - idx,
                    "run aborted; remaining scenarios not started"
                );
                break;
            }

            let runner = ScenarioRunner::new(
                scenario.clone(),
                globals.clone(),
                self.config,
                self.registry.clone(),
            )
            .with_abort(self.abort.child());

            let result = runner.run().await;
            on_result(&result);
            results.push(result);
        }

        RunReport::new(results, self.abort.is_aborted())
    }
}
