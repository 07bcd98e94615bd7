use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;
use volley_testserver::TestServer;

fn status_code(out: &Output) -> i32 {
    out.status.code().unwrap_or(-1)
}

fn ensure_exit(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn write_plan(dir: &Path, yaml: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join("plan.yaml");
    std::fs::write(&path, yaml).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

async fn volley(args: Vec<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_volley");
    tokio::task::spawn_blocking(move || Command::new(exe).args(&args).output())
        .await
        .context("spawn_blocking join")?
        .context("run volley binary")
}

fn args(items: &[&str], plan: &Path) -> Vec<String> {
    let mut out: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    out.insert(1, plan.display().to_string());
    out
}

const PING_PLAN: &str = r#"
variables:
  baseUrl: http://127.0.0.1:1
scenarios:
  - name: ping
    threads: 2
    iterations: 3
    requests:
      - name: ping
        url: "${baseUrl}/ping"
        assertions:
          status: 200
          body: pong
"#;

#[tokio::test]
async fn passing_run_exits_0_and_prints_json_lines() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let base = format!("baseUrl={}", server.base_url());

    let tmp = tempfile::tempdir().context("create tempdir")?;
    let plan = write_plan(tmp.path(), PING_PLAN)?;

    let out = volley(args(&["run", "--var", &base, "--output", "json"], &plan)).await?;
    let seen = server.stats().requests_total();
    server.shutdown().await;

    ensure_exit(&out, 0)?;
    anyhow::ensure!(seen == 6, "expected 6 requests, server saw {seen}");

    let stdout = String::from_utf8(out.stdout).context("stdout is utf-8")?;
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()
        .context("stdout is NDJSON")?;
    anyhow::ensure!(lines.len() == 2, "expected 2 lines, got {stdout}");
    anyhow::ensure!(lines[0]["kind"] == "scenario" && lines[0]["passed"] == true);
    anyhow::ensure!(lines[0]["metrics"]["totalRequests"] == 6);
    anyhow::ensure!(lines[1]["kind"] == "summary" && lines[1]["allPassed"] == true);

    Ok(())
}

#[tokio::test]
async fn below_threshold_exits_10() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let tmp = tempfile::tempdir().context("create tempdir")?;
    let plan = write_plan(
        tmp.path(),
        &format!(
            r#"
scenarios:
  - name: broken
    successThreshold: 90
    requests:
      - url: "{}"
"#,
            server.urls().status(500)
        ),
    )?;

    let out = volley(args(&["run"], &plan)).await?;
    server.shutdown().await;

    ensure_exit(&out, 10)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("result: FAIL"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("summary: 0/1 scenarios passed"), "stdout:\n{stdout}");
    Ok(())
}

#[tokio::test]
async fn unknown_protocol_is_a_scenario_error_exit_20() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir().context("create tempdir")?;
    let plan = write_plan(
        tmp.path(),
        r#"
scenarios:
  - name: ftp
    requests:
      - protocol: ftp
        endpoint: ftp://127.0.0.1/file
"#,
    )?;

    let out = volley(args(&["run"], &plan)).await?;
    ensure_exit(&out, 20)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("configuration error"), "stdout:\n{stdout}");
    Ok(())
}

#[tokio::test]
async fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = volley(vec![
        "run".to_string(),
        "./does-not-matter.yaml".to_string(),
        "--hold".to_string(),
        "10x".to_string(),
    ])
    .await?;
    ensure_exit(&out, 30)
}

#[tokio::test]
async fn invalid_document_exits_30() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir().context("create tempdir")?;
    let plan = write_plan(
        tmp.path(),
        r#"
scenarios:
  - name: typo
    thraeds: 4
    requests:
      - url: http://127.0.0.1:1/
"#,
    )?;

    let out = volley(args(&["run"], &plan)).await?;
    ensure_exit(&out, 30)?;
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("thraeds"), "stderr:\n{stderr}");

    let missing = volley(vec!["run".to_string(), "/no/such/plan.yaml".to_string()]).await?;
    ensure_exit(&missing, 30)
}

#[tokio::test]
async fn validate_checks_without_sending() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir().context("create tempdir")?;
    let good = write_plan(tmp.path(), PING_PLAN)?;

    let out = volley(args(&["validate"], &good)).await?;
    ensure_exit(&out, 0)?;
    anyhow::ensure!(String::from_utf8_lossy(&out.stdout).contains("ok: 1 scenarios"));

    let bad = write_plan(
        tmp.path(),
        r#"
scenarios:
  - name: users
    dataFiles:
      users: users.csv
    requests:
      - protocol: gopher
        url: gopher://127.0.0.1/
"#,
    )?;
    let out = volley(args(&["validate"], &bad)).await?;
    ensure_exit(&out, 30)?;
    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("gopher"), "stderr:\n{stderr}");
    anyhow::ensure!(stderr.contains("users.csv"), "stderr:\n{stderr}");
    Ok(())
}

#[tokio::test]
async fn report_file_holds_the_full_run() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let base = format!("baseUrl={}", server.base_url());

    let tmp = tempfile::tempdir().context("create tempdir")?;
    let plan = write_plan(tmp.path(), PING_PLAN)?;
    let report = tmp.path().join("out/nested/report.json");
    let report_arg = report.display().to_string();

    let out = volley(args(
        &["run", "--var", &base, "--iterations", "1", "--report", &report_arg],
        &plan,
    ))
    .await?;
    server.shutdown().await;
    ensure_exit(&out, 0)?;

    let text = tokio::fs::read_to_string(&report)
        .await
        .with_context(|| format!("read report: {}", report.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text).context("report is JSON")?;
    anyhow::ensure!(json["allPassed"] == true, "report:\n{text}");
    anyhow::ensure!(json["aborted"] == false, "report:\n{text}");
    anyhow::ensure!(
        json["results"][0]["metrics"]["totalRequests"] == 2,
        "report:\n{text}"
    );
    anyhow::ensure!(
        json["results"][0]["metrics"]["requests"][0]["name"] == "ping",
        "report:\n{text}"
    );
    Ok(())
}
