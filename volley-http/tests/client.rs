use volley_http::{HttpClient, HttpRequest};
use volley_testserver::TestServer;

#[tokio::test]
async fn get_reports_status_body_and_byte_counts() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let res = client.send(HttpRequest::get(server.urls().ping.clone())).await?;
    assert_eq!(res.status, 200);
    assert_eq!(res.body_utf8(), Some("pong"));
    assert!(res.bytes_received > res.body.len() as u64);
    assert!(res.bytes_sent > 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn post_sends_headers_query_and_body() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let mut req = HttpRequest::post(server.urls().echo.clone(), "hello")
        .header("content-type", "text/plain")
        .header("x-test", "1");
    req.query.push(("tag".to_string(), "a".to_string()));

    let res = client.send(req).await?;
    assert_eq!(res.status, 200);
    assert_eq!(res.body_utf8(), Some("hello"));
    assert_eq!(res.header("x-echo-tag"), Some("a"));
    assert_eq!(server.stats().saw_test_header(), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn request_timeout_surfaces_as_error() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let req = HttpRequest::get(server.urls().slow.clone())
        .timeout(Some(std::time::Duration::from_millis(5)));
    let err = match client.send(req).await {
        Ok(res) => anyhow::bail!("expected timeout, got status {}", res.status),
        Err(err) => err,
    };
    assert_eq!(
        err.transport_error_kind(),
        volley_http::HttpTransportErrorKind::Timeout
    );

    server.shutdown().await;
    Ok(())
}
