use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use volley_core::{
    Assertion, DataFile, Extraction, MissPolicy, ProtocolRegistry, Request, RunnerConfig, Scenario,
    ScenarioSet, ScenarioState, TemplateSyntax, TestExecutionController,
};
use volley_testserver::TestServer;

fn controller(config: RunnerConfig) -> TestExecutionController {
    TestExecutionController::new(config, Arc::new(ProtocolRegistry::new()))
}

fn users_csv() -> anyhow::Result<tempfile::NamedTempFile> {
    let mut f = tempfile::NamedTempFile::new().context("create csv")?;
    f.write_all(b"user,password\nalice,a1\nbob,b2\n")
        .context("write csv")?;
    Ok(f)
}

#[tokio::test]
async fn login_token_flows_into_the_next_request() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let csv = users_csv()?;

    let scenario = Scenario::new("auth")
        .description("login then call an authorized endpoint")
        .data_file(DataFile::new("users", csv.path()))
        .request(
            Request::new("login", "http", "${baseUrl}/login")
                .method("post")
                .header("content-type", "application/json")
                .body(r#"{"username":"${user}","password":"${password}"}"#)
                .data_source("users")
                .assert(Assertion::parse("status", "200")?)
                .assert(Assertion::parse("$.user.roles[0]", "tester")?)
                .extract(Extraction::parse("token", "$.token")?)
                .extract(Extraction::parse("who", "$.user.name")?),
        )
        .request(
            Request::new("whoami", "http", "${baseUrl}/whoami")
                .header("authorization", "Bearer ${token}")
                .assert(Assertion::parse("$.user", "${who}")?),
        )
        .iterations(2);

    let set = ScenarioSet::new()
        .variable("baseUrl", server.base_url())
        .scenario(scenario);
    let report = controller(RunnerConfig::default()).run(&set).await;

    let result = &report.results[0];
    anyhow::ensure!(
        report.all_passed,
        "expected the auth flow to pass: {:?}",
        result.metrics.errors
    );
    assert_eq!(result.state, ScenarioState::Completed);
    assert_eq!(result.metrics.total_requests, 4);
    assert_eq!(result.resolution_misses, 0);
    assert_eq!(server.stats().logins(), 2);
    assert_eq!(server.stats().authorized(), 2);

    let names: Vec<_> = result.metrics.requests.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["login", "whoami"]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn headers_params_and_vu_variables_reach_the_server() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let scenario = Scenario::new("echo")
        .request(
            Request::new("echo", "http", server.urls().echo.clone())
                .method("POST")
                .header("x-test", "1")
                .param("tag", "vu-${vu.thread}")
                .body("hello from ${vu.thread}/${vu.iteration}")
                .assert(Assertion::parse("header.x-echo-tag", "vu-${vu.thread}")?)
                .assert(Assertion::parse("body", "hello from")?),
        )
        .threads(2)
        .iterations(2);

    let report = controller(RunnerConfig::default())
        .run(&ScenarioSet::new().scenario(scenario))
        .await;
    let result = &report.results[0];

    anyhow::ensure!(result.passed, "echo failed: {:?}", result.metrics.errors);
    assert_eq!(result.metrics.total_requests, 4);
    assert_eq!(server.stats().saw_test_header(), 4);
    assert!(result.metrics.bytes_sent > 0);
    assert!(result.metrics.bytes_received > 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn error_statuses_fail_the_threshold() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let failing = Scenario::new("failing")
        .request(Request::new("boom", "http", server.urls().status(500)))
        .iterations(3);
    let mut lenient = Scenario::new("lenient")
        .request(Request::new("ok", "http", server.urls().ping.clone()))
        .request(Request::new("boom", "http", server.urls().status(503)));
    lenient.profile.success_threshold = 50.0;

    let report = controller(RunnerConfig::default())
        .run(&ScenarioSet::new().scenario(failing).scenario(lenient))
        .await;

    let failing = &report.results[0];
    assert!(!failing.passed);
    assert!(failing.failed_threshold());
    assert_eq!(failing.metrics.success_rate_percent, 0.0);
    assert_eq!(failing.metrics.errors.get("HTTP 500"), Some(&3));

    let lenient = &report.results[1];
    assert!(lenient.passed);
    assert_eq!(lenient.metrics.success_rate_percent, 50.0);
    assert!(!report.all_passed);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn strict_misses_are_never_sent() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let scenario = Scenario::new("strict")
        .request(Request::new("ping", "http", "${baseUrl}/ping?x=${missing}"))
        .variable("baseUrl", server.base_url());

    let config = RunnerConfig::default().miss_policy(MissPolicy::Strict);
    let report = controller(config)
        .run(&ScenarioSet::new().scenario(scenario))
        .await;
    let result = &report.results[0];

    assert_eq!(result.state, ScenarioState::Completed);
    assert!(!result.passed);
    assert_eq!(result.metrics.failure_count, 1);
    assert!(
        result.metrics.errors.keys().any(|e| e.contains("missing")),
        "{:?}",
        result.metrics.errors
    );
    assert_eq!(server.stats().requests_total(), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn lenient_misses_are_counted_and_sent_empty() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let scenario = Scenario::new("lenient")
        .request(Request::new("ping", "http", "${baseUrl}/ping${missing}"))
        .variable("baseUrl", server.base_url())
        .iterations(2);

    let report = controller(RunnerConfig::default())
        .run(&ScenarioSet::new().scenario(scenario))
        .await;
    let result = &report.results[0];

    anyhow::ensure!(result.passed, "{:?}", result.metrics.errors);
    assert_eq!(result.resolution_misses, 2);
    assert_eq!(server.stats().requests_total(), 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn mustache_syntax_and_scope_precedence() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    // Scenario value beats the global one; the request override beats both.
    let scenario = Scenario::new("mustache")
        .variable("path", "status/500")
        .request(
            Request::new("ping", "http", "{{baseUrl}}/{{path}}")
                .variable("path", "ping")
                .assert(Assertion::parse("body", "pong")?),
        );
    let set = ScenarioSet::new()
        .variable("baseUrl", server.base_url())
        .variable("path", "status/404")
        .scenario(scenario);

    let config = RunnerConfig::default().template_syntax(TemplateSyntax::Mustache);
    let report = controller(config).run(&set).await;
    let result = &report.results[0];

    anyhow::ensure!(result.passed, "{:?}", result.metrics.errors);
    assert_eq!(result.metrics.total_requests, 1);

    server.shutdown().await;
    Ok(())
}
