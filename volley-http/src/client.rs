use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::size;
use crate::{Error, HttpRequest, HttpResponse, Result};

/// Pooled HTTP/1.1 client shared by every HTTP-based executor.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // OS connect timeouts can run to tens of seconds; an unreachable target
        // should fail fast instead of stalling a worker.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(connect_timeout);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    pub async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        match req.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.send_inner(req))
                .await
                .unwrap_or(Err(Error::Timeout(timeout))),
            None => self.send_inner(req).await,
        }
    }

    async fn send_inner(&self, req: HttpRequest) -> Result<HttpResponse> {
        let uri = target_uri(&req.url, &req.query)?;

        let mut builder = hyper::Request::builder()
            .method(req.method.clone())
            .uri(uri.clone());

        if !req.has_header("host")
            && let Some(authority) = uri.authority()
        {
            builder = builder.header(http::header::HOST, authority.as_str());
        }
        if !req.body.is_empty() && !req.has_header("content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }
        for (k, v) in &req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let request = builder.body(Full::new(req.body.clone()))?;
        let bytes_sent = size::request_head(request.method(), request.uri(), request.headers())
            .saturating_add(req.body.len() as u64);

        let response = self.inner.request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();

        let bytes_received =
            size::response_head(parts.status, &parts.headers).saturating_add(body.len() as u64);

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            headers: merge_headers(&parts.headers),
            body,
            bytes_sent,
            bytes_received,
        })
    }
}

fn target_uri(raw: &str, query: &[(String, String)]) -> Result<hyper::Uri> {
    let mut url = url::Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::UnsupportedScheme(raw.to_string()));
    }

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }

    url.as_str()
        .parse()
        .map_err(|_| Error::InvalidUrl(raw.to_string()))
}

fn merge_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let v = String::from_utf8_lossy(value.as_bytes()).into_owned();
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                cur.push_str(", ");
                cur.push_str(&v);
            })
            .or_insert(v);
    }
    merged.into_iter().collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Instant;

    #[test]
    fn target_uri_appends_query_params() {
        let uri = target_uri(
            "http://example.com/search?x=1",
            &[("q".to_string(), "a b".to_string())],
        )
        .unwrap();
        assert_eq!(uri.to_string(), "http://example.com/search?x=1&q=a+b");
    }

    #[test]
    fn target_uri_rejects_other_schemes() {
        let err = target_uri("ftp://example.com/", &[]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
        let err = target_uri("not a url", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let _err = client.send(req).await.unwrap_err();

        assert!(
            started.elapsed() < Duration::from_secs(2),
            "expected fast failure, elapsed={:?}",
            started.elapsed()
        );
    }
}
