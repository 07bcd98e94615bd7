use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tokio::task::JoinSet;
use volley_metrics::MetricsAggregator;

use super::config::RunnerConfig;
use super::error::{Error, Result};
use super::gate::HoldGate;
use super::ramp::RampSchedule;
use super::result::{FailureReason, ScenarioResult};
use super::signal::AbortHandle;
use super::state::ScenarioState;
use super::worker::{self, DataSelection, Plan, PreparedRequest};
use crate::model::Scenario;
use crate::protocol::ProtocolRegistry;
use crate::scope::{VariableScope, Variables};

/// Runs one scenario: validates and prepares it, spawns `threads` workers
/// that each run `iterations` passes over the request list (then the hold
/// phase, if any), and turns the aggregated outcomes into a verdict.
///
/// The current [`ScenarioState`] can be polled with [`state`](Self::state) or
/// watched through [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    globals: Arc<Variables>,
    config: RunnerConfig,
    registry: Arc<ProtocolRegistry>,
    abort: AbortHandle,
    state: watch::Sender<ScenarioState>,
}

impl ScenarioRunner {
    pub fn new(
        scenario: Scenario,
        globals: Arc<Variables>,
        config: RunnerConfig,
        registry: Arc<ProtocolRegistry>,
    ) -> Self {
        Self {
            scenario,
            globals,
            config,
            registry,
            abort: AbortHandle::new(),
            state: watch::Sender::new(ScenarioState::Idle),
        }
    }

    /// Stop this run when `abort` fires.
    #[must_use]
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn state(&self) -> ScenarioState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScenarioState> {
        self.state.subscribe()
    }

    /// Run to completion. Never fails: setup errors end up in
    /// [`ScenarioResult::failure`] with state `Failed`.
    ///
    /// A runner runs once. Later calls send nothing and return a `Failed`
    /// result with [`Error::AlreadyRan`]; the watched state is left as it was.
    pub async fn run(&self) -> ScenarioResult {
        let aggregator = Arc::new(MetricsAggregator::new(self.config.percentiles));

        if !self.start() {
            let err = Error::AlreadyRan;
            tracing::error!(scenario = %self.scenario.name, state = %self.state(), "{err}");
            aggregator.freeze();
            return self.result(ScenarioState::Failed, &aggregator, None, Some(&err));
        }

        // Local handle: a crashed worker stops its siblings without flagging
        // the whole run as aborted.
        let local = self.abort.child();
        let plan = match self.prepare(aggregator.clone(), local.clone()).await {
            Ok(plan) => Arc::new(plan),
            Err(err) => {
                tracing::error!(scenario = %self.scenario.name, error = %err, "scenario setup failed");
                aggregator.freeze();
                self.transition(ScenarioState::Failed);
                return self.result(ScenarioState::Failed, &aggregator, None, Some(&err));
            }
        };

        self.transition(ScenarioState::Running);
        tracing::info!(
            scenario = %self.scenario.name,
            threads = self.scenario.profile.threads,
            iterations = self.scenario.profile.iterations,
            ramp_up_seconds = self.scenario.profile.ramp_up_seconds,
            hold_seconds = self.scenario.profile.hold_seconds,
            "scenario started"
        );

        let outcome = self.drive(&plan).await;
        aggregator.freeze();

        let state = match &outcome {
            Ok(()) => ScenarioState::Completed,
            Err(err) => {
                tracing::error!(scenario = %self.scenario.name, error = %err, "scenario failed");
                ScenarioState::Failed
            }
        };
        self.transition(state);

        let result = self.result(state, &aggregator, Some(&plan), outcome.as_ref().err());
        if result.resolution_misses > 0 {
            tracing::warn!(
                scenario = %result.name,
                misses = result.resolution_misses,
                "some variables never resolved"
            );
        }
        tracing::info!(
            scenario = %result.name,
            passed = result.passed,
            aborted = result.aborted,
            total = result.metrics.total_requests,
            success_rate = result.metrics.success_rate_percent,
            threshold = result.success_threshold,
            "scenario finished"
        );
        result
    }

    /// `Idle → Initializing`, atomically; `false` if the runner left `Idle`
    /// already.
    fn start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state != ScenarioState::Idle {
                return false;
            }
            tracing::debug!(scenario = %self.scenario.name, from = %state, to = %ScenarioState::Initializing, "state change");
            *state = ScenarioState::Initializing;
            true
        })
    }

    fn transition(&self, next: ScenarioState) {
        self.state.send_modify(|state| {
            debug_assert!(state.can_transition_to(next), "{state} -> {next}");
            tracing::debug!(scenario = %self.scenario.name, from = %state, to = %next, "state change");
            *state = next;
        });
    }

    /// Everything that can be checked without I/O is checked before the data
    /// files are read, so configuration errors win over fatal ones.
    async fn prepare(&self, aggregator: Arc<MetricsAggregator>, abort: AbortHandle) -> Result<Plan> {
        let scenario = &self.scenario;
        let profile = &scenario.profile;
        scenario.validate()?;

        let mut requests = Vec::with_capacity(scenario.requests.len());
        for request in &scenario.requests {
            let kind = ProtocolRegistry::parse(&request.protocol).map_err(|source| {
                Error::Protocol {
                    request: request.name.to_string(),
                    source,
                }
            })?;
            let data = request
                .data_source
                .as_ref()
                .and_then(|name| scenario.data_files.iter().position(|f| f.name == *name))
                .map_or(DataSelection::All, DataSelection::One);

            requests.push(PreparedRequest {
                request: request.clone(),
                kind,
                executor: self.registry.executor(kind),
                data,
            });
        }

        let data = crate::data::load_all(&scenario.data_files).await?;

        let base = VariableScope::new()
            .with_layer(self.globals.clone())
            .with_layer(Arc::new(scenario.variables.clone()));

        let hold = (profile.hold_seconds > 0).then(|| {
            HoldGate::new(
                profile.hold(),
                usize::try_from(profile.threads).unwrap_or(usize::MAX),
            )
        });

        Ok(Plan::new(
            Arc::from(scenario.name.as_str()),
            base,
            data,
            requests,
            self.config.resolver(),
            self.config.request_timeout,
            profile.iterations,
            RampSchedule::new(profile.ramp_up(), profile.threads),
            hold,
            aggregator,
            abort,
        ))
    }

    async fn drive(&self, plan: &Arc<Plan>) -> Result<()> {
        let mut workers = JoinSet::new();
        for k in 0..self.scenario.profile.threads {
            workers.spawn(worker::run_worker(plan.clone(), k));
        }

        let mut failed = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                plan.abort.abort();
                failed.get_or_insert(err);
            }
        }

        match failed {
            Some(err) => Err(Error::Worker(err)),
            None => Ok(()),
        }
    }

    fn result(
        &self,
        state: ScenarioState,
        aggregator: &MetricsAggregator,
        plan: Option<&Plan>,
        error: Option<&Error>,
    ) -> ScenarioResult {
        let metrics = aggregator.snapshot();
        let aborted = self.abort.is_aborted();
        let threshold = self.scenario.profile.success_threshold;
        let passed = state == ScenarioState::Completed
            && !aborted
            && metrics.success_rate_percent >= threshold;

        let count = |pick: fn(&worker::Counters) -> &std::sync::atomic::AtomicU64| {
            plan.map_or(0, |p| pick(&p.counters).load(Ordering::Relaxed))
        };

        ScenarioResult {
            name: self.scenario.name.clone(),
            description: self.scenario.description.clone(),
            state,
            passed,
            success_threshold: threshold,
            metrics,
            failure: error.map(FailureReason::from),
            aborted,
            passes: count(|c| &c.passes),
            resolution_misses: count(|c| &c.misses),
            template_warnings: count(|c| &c.warnings),
        }
    }
}
