use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashSet;
use parking_lot::Mutex;
use volley_metrics::{MetricsAggregator, RequestOutcome};
use volley_value::{ObjectMap, Value};

use super::gate::HoldGate;
use super::ramp::RampSchedule;
use super::signal::AbortHandle;
use crate::check::Expected;
use crate::data::DataRows;
use crate::model::Request;
use crate::protocol::{Exchange, ProtocolExecutor, ProtocolKind, ResolvedRequest};
use crate::response::Inspector;
use crate::scope::{PassScope, ScopeView, VariableScope, Variables};
use crate::template::{self, Diagnostics, Resolver};

/// Which data files feed a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataSelection {
    All,
    One(usize),
}

/// A request bound to its executor during initialization.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub request: Request,
    pub kind: ProtocolKind,
    pub executor: Arc<dyn ProtocolExecutor>,
    pub data: DataSelection,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub passes: AtomicU64,
    pub misses: AtomicU64,
    pub warnings: AtomicU64,
}

/// Everything the workers of one scenario share. Read-only apart from the
/// aggregator and the counters.
#[derive(Debug)]
pub(crate) struct Plan {
    pub scenario: Arc<str>,
    pub base: VariableScope,
    pub data: Vec<DataRows>,
    pub requests: Vec<PreparedRequest>,
    pub resolver: Resolver,
    pub request_timeout: Duration,
    pub iterations: u64,
    pub ramp: RampSchedule,
    pub hold: Option<HoldGate>,
    pub aggregator: Arc<MetricsAggregator>,
    pub abort: AbortHandle,
    pub counters: Counters,
    /// `request/name` pairs already logged as misses.
    warned: Mutex<AHashSet<String>>,
}

impl Plan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scenario: Arc<str>,
        base: VariableScope,
        data: Vec<DataRows>,
        requests: Vec<PreparedRequest>,
        resolver: Resolver,
        request_timeout: Duration,
        iterations: u64,
        ramp: RampSchedule,
        hold: Option<HoldGate>,
        aggregator: Arc<MetricsAggregator>,
        abort: AbortHandle,
    ) -> Self {
        Self {
            scenario,
            base,
            data,
            requests,
            resolver,
            request_timeout,
            iterations,
            ramp,
            hold,
            aggregator,
            abort,
            counters: Counters::default(),
            warned: Mutex::new(AHashSet::new()),
        }
    }

    fn note(&self, request: &str, diag: &Diagnostics) {
        if diag.is_clean() {
            return;
        }
        self.counters
            .misses
            .fetch_add(diag.misses.len() as u64, Ordering::Relaxed);
        self.counters
            .warnings
            .fetch_add(diag.warnings.len() as u64, Ordering::Relaxed);

        let mut warned = self.warned.lock();
        for name in &diag.misses {
            if warned.insert(format!("{request}/{name}")) {
                tracing::warn!(
                    scenario = %self.scenario,
                    request,
                    variable = %name,
                    "unresolved variable substituted with an empty string"
                );
            }
        }
        for warning in &diag.warnings {
            if warned.insert(format!("{request}/{warning}")) {
                tracing::warn!(scenario = %self.scenario, request, "{warning}");
            }
        }
    }
}

/// One virtual user: ramp-up delay, the fixed iterations, then the hold phase.
/// `worker` is 0-based; templates see it 1-based as `vu.thread`.
pub(crate) async fn run_worker(plan: Arc<Plan>, worker: u64) {
    let offset = plan.ramp.start_offset(worker);
    if !offset.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(offset) => {}
            _ = plan.abort.cancelled() => return,
        }
    }

    let thread = worker + 1;
    let mut iteration = 0;
    while iteration < plan.iterations {
        if plan.abort.is_aborted() {
            return;
        }
        run_pass(&plan, thread, iteration).await;
        iteration += 1;
    }

    let Some(hold) = &plan.hold else {
        return;
    };
    if !hold.arrive(&plan.abort).await {
        return;
    }
    while hold.is_open() && !plan.abort.is_aborted() {
        run_pass(&plan, thread, iteration).await;
        iteration += 1;
    }
}

fn vu_layer(thread: u64, iteration: u64) -> Variables {
    let mut vu = ObjectMap::new();
    vu.insert(Arc::from("thread"), Value::from(thread.to_string()));
    vu.insert(Arc::from("iteration"), Value::from(iteration.to_string()));

    let mut layer = Variables::new();
    layer.insert(Arc::from("vu"), Value::Map(vu));
    layer
}

/// Every request of the scenario, in declared order, with a fresh pass scope.
/// A pass cut short by an abort is not counted.
async fn run_pass(plan: &Plan, thread: u64, iteration: u64) {
    let vu = vu_layer(thread, iteration);
    let mut pass = PassScope::new();

    for prepared in &plan.requests {
        if plan.abort.is_aborted() {
            return;
        }
        let captured = dispatch(plan, prepared, &vu, &pass, iteration).await;
        for (name, value) in captured {
            pass.set(name, value);
        }
    }

    plan.counters.passes.fetch_add(1, Ordering::Relaxed);
}

/// Resolve, execute, check and record one request. Returns the values it
/// extracted; the caller writes them into the pass scope once the view that
/// borrows it is gone.
async fn dispatch(
    plan: &Plan,
    prepared: &PreparedRequest,
    vu: &Variables,
    pass: &PassScope,
    iteration: u64,
) -> Vec<(Arc<str>, Value)> {
    let request = &prepared.request;

    let mut view = plan.base.view();
    match prepared.data {
        DataSelection::All => {
            for rows in &plan.data {
                if let Some(row) = rows.row(iteration) {
                    view.push(row);
                }
            }
        }
        DataSelection::One(idx) => {
            if let Some(row) = plan.data.get(idx).and_then(|rows| rows.row(iteration)) {
                view.push(row);
            }
        }
    }
    view.push(vu);
    view.push(pass.captured());
    view.push(&request.variables);

    let mut diag = Diagnostics::default();
    let resolved = resolve_request(plan, prepared, &view, &mut diag);
    plan.note(&request.name, &diag);

    let resolved = match resolved {
        Ok(resolved) => resolved,
        Err(err) => {
            // Strict mode: the request is never sent.
            let outcome = RequestOutcome::failure(request.name.clone(), Duration::ZERO, err.to_string());
            plan.aggregator.record(&outcome);
            return Vec::new();
        }
    };

    let Exchange {
        mut outcome,
        response,
    } = prepared.executor.execute(&resolved, &view).await;
    let inspect = Inspector::new(&response);

    if outcome.success {
        diag.clear();
        for assertion in &request.assertions {
            let expected = match &assertion.expected {
                Expected::Exists => None,
                Expected::Equals(template) => {
                    match plan.resolver.resolve_with(template, &view, &mut diag) {
                        Ok(value) => Some(value),
                        Err(err) => {
                            outcome = outcome.with_failure(format!("assertion on `{}`: {err}", assertion.path));
                            break;
                        }
                    }
                }
            };
            if let Err(message) = assertion.evaluate(&inspect, expected.as_deref()) {
                outcome = outcome.with_failure(message);
                break;
            }
        }
        plan.note(&request.name, &diag);
    }

    let mut captured = Vec::with_capacity(request.extract.len());
    for extraction in &request.extract {
        match extraction.extract(&inspect) {
            Some(value) => captured.push((extraction.variable.clone(), value)),
            None => tracing::warn!(
                scenario = %plan.scenario,
                request = %request.name,
                variable = %extraction.variable,
                path = %extraction.path,
                "extraction found nothing"
            ),
        }
    }

    if !outcome.success {
        tracing::debug!(
            scenario = %plan.scenario,
            request = %request.name,
            error = outcome.error.as_deref().unwrap_or_default(),
            "request failed"
        );
    }
    plan.aggregator.record(&outcome);
    captured
}

fn resolve_request(
    plan: &Plan,
    prepared: &PreparedRequest,
    view: &ScopeView<'_>,
    diag: &mut Diagnostics,
) -> template::Result<ResolvedRequest> {
    let request = &prepared.request;
    let mut resolve = |s: &str| plan.resolver.resolve_with(s, view, diag);

    let endpoint = resolve(&request.endpoint)?;
    let method = resolve(&request.method)?;
    let body = request.body.as_deref().map(&mut resolve).transpose()?;

    let mut headers = Vec::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        headers.push((name.clone(), resolve(value)?));
    }
    let mut params = Vec::with_capacity(request.params.len());
    for (name, value) in &request.params {
        params.push((name.clone(), resolve(value)?));
    }

    Ok(ResolvedRequest {
        name: request.name.clone(),
        protocol: prepared.kind,
        endpoint,
        method,
        body,
        headers,
        params,
        timeout: request.timeout.unwrap_or(plan.request_timeout),
    })
}
