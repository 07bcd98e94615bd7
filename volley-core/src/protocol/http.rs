use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use volley_http::{HttpClient, HttpRequest, HttpResponse};
use volley_metrics::RequestOutcome;

use super::{Exchange, ProtocolError, ProtocolExecutor, ProtocolKind, ResolvedRequest, timed};
use crate::response::ResponseContent;
use crate::scope::ScopeView;

/// Plain HTTP(S) requests. A response status of 400 or above fails the outcome.
///
/// `http` accepts both schemes; `https` refuses to send anything over a
/// plaintext `http://` endpoint.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    kind: ProtocolKind,
    client: Arc<HttpClient>,
}

impl HttpExecutor {
    pub fn new(kind: ProtocolKind, client: Arc<HttpClient>) -> Self {
        Self { kind, client }
    }
}

#[async_trait]
impl ProtocolExecutor for HttpExecutor {
    fn protocol(&self) -> ProtocolKind {
        self.kind
    }

    async fn execute(&self, request: &ResolvedRequest, _scope: &ScopeView<'_>) -> Exchange {
        timed(request, async {
            if self.kind == ProtocolKind::Https && !is_https(&request.endpoint) {
                return Err(ProtocolError::endpoint(
                    &request.endpoint,
                    "protocol `https` requires an https:// endpoint",
                ));
            }
            let req = build_request(request, "GET")?
                .body(Bytes::copy_from_slice(request.body_bytes()));
            let started = Instant::now();
            let res = self.client.send(req).await?;
            Ok(exchange_from_response(request, res, started))
        })
        .await
    }
}

fn is_https(endpoint: &str) -> bool {
    url::Url::parse(endpoint.trim()).is_ok_and(|u| u.scheme() == "https")
}

/// Method, url, headers, query and timeout. The body is left to the caller.
pub(crate) fn build_request(
    request: &ResolvedRequest,
    default_method: &str,
) -> Result<HttpRequest, ProtocolError> {
    let method = match request.method.trim() {
        "" => default_method.to_string(),
        m => m.to_ascii_uppercase(),
    };
    let method = http::Method::from_bytes(method.as_bytes())
        .map_err(|_| ProtocolError::InvalidMethod(method.clone()))?;

    let mut req = HttpRequest::new(method, request.endpoint.clone()).timeout(Some(request.timeout));
    req.headers.extend(request.headers.iter().cloned());
    req.query.extend(request.params.iter().cloned());
    Ok(req)
}

pub(crate) fn response_content(res: HttpResponse) -> ResponseContent {
    ResponseContent {
        status: Some(res.status),
        headers: res.headers,
        body: res.body,
    }
}

/// Status-based outcome: below 400 succeeds.
pub(crate) fn exchange_from_response(
    request: &ResolvedRequest,
    res: HttpResponse,
    started: Instant,
) -> Exchange {
    let elapsed = started.elapsed();
    let status = res.status;
    let mut outcome =
        RequestOutcome::success(request.name.clone(), Some(status), elapsed, res.bytes_received)
            .with_bytes_sent(res.bytes_sent);
    if status >= 400 {
        outcome = outcome.with_failure(format!("HTTP {status}"));
    }
    Exchange::new(outcome, response_content(res))
}
