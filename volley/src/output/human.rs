use std::fmt::Write as _;
use std::path::Path;

use volley_core::{RunReport, ScenarioResult, ScenarioSet, ScenarioState};

mod format;

use format::{format_bytes, format_ms, format_percent, format_rate};

use super::OutputFormatter;

/// Distinct error messages listed per scenario.
const MAX_ERRORS_SHOWN: usize = 10;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, document: &Path, set: &ScenarioSet) {
        println!("document: {}", document.display());
        for s in &set.scenarios {
            let p = &s.profile;
            println!(
                "scenario: {} threads={} iterations={} ramp_up={}s hold={}s threshold={}",
                s.name,
                p.threads,
                p.iterations,
                p.ramp_up_seconds,
                p.hold_seconds,
                format_percent(p.success_threshold)
            );
        }
        if !set.scenarios.is_empty() {
            println!();
        }
    }

    fn scenario_finished(&self, result: &ScenarioResult) {
        print!("{}", render_scenario(result));
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        print!("{}", render_summary(report));
        Ok(())
    }
}

fn verdict(result: &ScenarioResult) -> &'static str {
    if result.passed {
        "PASS"
    } else if result.failure.is_some() {
        "ERROR"
    } else if result.aborted {
        "ABORTED"
    } else {
        "FAIL"
    }
}

pub(crate) fn render_scenario(r: &ScenarioResult) -> String {
    let mut out = String::new();
    let m = &r.metrics;

    write!(&mut out, "scenario: {}", r.name).ok();
    if !r.description.is_empty() {
        write!(&mut out, " ({})", r.description).ok();
    }
    out.push('\n');
    writeln!(&mut out, "  result: {} [{}]", verdict(r), r.state).ok();

    if let Some(failure) = &r.failure {
        writeln!(&mut out, "  {} error: {}", failure.kind, failure.message).ok();
    }

    if r.state == ScenarioState::Failed && m.total_requests == 0 {
        out.push('\n');
        return out;
    }

    writeln!(
        &mut out,
        "  requests: {} (failed {}) success rate {} (threshold {})",
        m.total_requests,
        m.failure_count,
        format_percent(m.success_rate_percent),
        format_percent(r.success_threshold)
    )
    .ok();
    writeln!(
        &mut out,
        "  latency: avg={} min={} p50={} p90={} p95={} p99={} max={} stdev={}",
        format_ms(m.avg_response_time_ms),
        format_ms(m.min_response_time_ms),
        format_ms(m.p50_ms),
        format_ms(m.p90_ms),
        format_ms(m.p95_ms),
        format_ms(m.p99_ms),
        format_ms(m.max_response_time_ms),
        format_ms(m.std_dev_ms)
    )
    .ok();
    writeln!(
        &mut out,
        "  throughput: {} req/s over {} ({} passes)",
        format_rate(m.throughput_per_sec),
        format_ms(m.duration_ms as f64),
        r.passes
    )
    .ok();
    writeln!(
        &mut out,
        "  bytes: recv {} sent {}",
        format_bytes(m.bytes_received),
        format_bytes(m.bytes_sent)
    )
    .ok();

    if r.resolution_misses > 0 || r.template_warnings > 0 {
        writeln!(
            &mut out,
            "  unresolved variables: {} malformed templates: {}",
            r.resolution_misses, r.template_warnings
        )
        .ok();
    }

    if !m.errors.is_empty() {
        out.push_str("  errors:\n");
        let mut errors: Vec<_> = m.errors.iter().collect();
        errors.sort_by(|(a_msg, a_count), (b_msg, b_count)| {
            b_count.cmp(a_count).then_with(|| a_msg.cmp(b_msg))
        });
        for (message, count) in errors.iter().take(MAX_ERRORS_SHOWN) {
            writeln!(&mut out, "    {message}: {count}").ok();
        }
        if errors.len() > MAX_ERRORS_SHOWN {
            writeln!(&mut out, "    ... {} more", errors.len() - MAX_ERRORS_SHOWN).ok();
        }
    }

    if m.requests.len() > 1 {
        let width = m
            .requests
            .iter()
            .map(|q| q.name.len())
            .max()
            .unwrap_or(0)
            .max("request".len());
        writeln!(
            &mut out,
            "  {:<width$}  {:>8}  {:>8}  {:>10}  {:>10}  {:>10}",
            "request", "total", "ok", "avg", "p90", "p95"
        )
        .ok();
        for q in &m.requests {
            writeln!(
                &mut out,
                "  {:<width$}  {:>8}  {:>8}  {:>10}  {:>10}  {:>10}",
                q.name,
                q.total_requests,
                format_percent(q.success_rate_percent),
                format_ms(q.avg_response_time_ms),
                format_ms(q.p90_ms),
                format_ms(q.p95_ms)
            )
            .ok();
        }
    }

    out.push('\n');
    out
}

pub(crate) fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let total = report.results.len();

    write!(
        &mut out,
        "summary: {}/{} scenarios passed",
        report.passed(),
        total
    )
    .ok();
    let errored = report.errored();
    if errored > 0 {
        write!(&mut out, ", {errored} errored").ok();
    }
    if report.aborted {
        out.push_str(" (aborted)");
    }
    out.push('\n');
    out
}
