use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use volley_core::{
    MissPolicy, ProtocolRegistry, RunReport, RunnerConfig, ScenarioSet, TestExecutionController,
    Value,
};

use crate::cli::{RunArgs, ValidateArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::scenario_yaml::{self, DocumentYaml};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let doc = scenario_yaml::read_document(&args.file)
        .await
        .map_err(RunError::InvalidInput)?;
    let set = scenario_set(&doc, &args).map_err(RunError::InvalidInput)?;
    let config = runner_config(&doc, &args);
    let registry = Arc::new(registry(&doc, &args));

    let controller = TestExecutionController::new(config, registry);
    let interrupt = spawn_interrupt_listener(&controller);

    out.print_header(&args.file, &set);
    let report = controller
        .run_with(&set, |result| out.scenario_finished(result))
        .await;
    interrupt.abort();

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.report {
        write_report(path, &report)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_report(&report))
}

/// Loads a document and runs every check that needs no network.
pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let doc = scenario_yaml::read_document(&args.file)
        .await
        .map_err(RunError::InvalidInput)?;
    let set = doc
        .to_scenario_set(base_dir(&args.file))
        .map_err(RunError::InvalidInput)?;

    let mut problems = Vec::new();
    for scenario in &set.scenarios {
        if let Err(err) = scenario.validate() {
            problems.push(format!("scenario `{}`: {err}", scenario.name));
        }
        for file in &scenario.data_files {
            if tokio::fs::metadata(&file.path).await.is_err() {
                problems.push(format!(
                    "scenario `{}`: data file `{}` not found: {}",
                    scenario.name,
                    file.name,
                    file.path.display()
                ));
            }
        }
    }

    if !problems.is_empty() {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "{} problem(s) in {}:\n  {}",
            problems.len(),
            args.file.display(),
            problems.join("\n  ")
        )));
    }

    println!("ok: {} scenarios", set.scenarios.len());
    Ok(ExitCode::Success)
}

fn base_dir(document: &Path) -> &Path {
    document.parent().unwrap_or(Path::new("."))
}

fn scenario_set(doc: &DocumentYaml, args: &RunArgs) -> anyhow::Result<ScenarioSet> {
    let mut set = doc.to_scenario_set(base_dir(&args.file))?;

    if !args.scenarios.is_empty() {
        for wanted in &args.scenarios {
            if !set.scenarios.iter().any(|s| s.name == *wanted) {
                anyhow::bail!("unknown scenario `{wanted}` (--scenario)");
            }
        }
        set.scenarios.retain(|s| args.scenarios.contains(&s.name));
    }

    for scenario in &mut set.scenarios {
        if let Some(threads) = args.threads {
            scenario.profile.threads = threads;
        }
        if let Some(iterations) = args.iterations {
            scenario.profile.iterations = iterations;
        }
        if let Some(hold) = args.hold {
            scenario.profile.hold_seconds = whole_seconds(hold);
        }
    }

    for (name, value) in &args.vars {
        set.variables
            .insert(Arc::from(name.as_str()), Value::from(value.as_str()));
    }

    Ok(set)
}

/// Sub-second holds round up so `--hold 500ms` still holds.
fn whole_seconds(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

fn runner_config(doc: &DocumentYaml, args: &RunArgs) -> RunnerConfig {
    let mut config = doc.runner_config();
    if args.strict_vars {
        config = config.miss_policy(MissPolicy::Strict);
    }
    if let Some(timeout) = args.timeout {
        config = config.request_timeout(timeout);
    }
    if let Some(mode) = args.percentiles {
        config = config.percentiles(mode);
    }
    config
}

fn registry(doc: &DocumentYaml, args: &RunArgs) -> ProtocolRegistry {
    let connect_timeout = args
        .connect_timeout
        .or_else(|| doc.config.connect_timeout.map(|t| t.into_inner()));
    match connect_timeout {
        Some(timeout) => ProtocolRegistry::with_connect_timeout(timeout),
        None => ProtocolRegistry::new(),
    }
}

/// First Ctrl-C stops workers after their in-flight request; the report is
/// still printed.
fn spawn_interrupt_listener(controller: &TestExecutionController) -> tokio::task::JoinHandle<()> {
    let abort = controller.abort_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupted; stopping scenarios");
                abort.abort();
            }
            Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c"),
        }
    })
}

async fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(report).context("failed to encode report")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create report dir: {}", parent.display()))?;
    }
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write report: {}", path.display()))
}
