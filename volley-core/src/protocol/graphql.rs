use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as Json, json};
use tokio::time::Instant;
use volley_http::HttpClient;

use super::http::{build_request, exchange_from_response};
use super::{Exchange, ProtocolExecutor, ProtocolKind, ResolvedRequest, timed};
use crate::scope::ScopeView;

/// GraphQL over HTTP POST.
///
/// The request body is the query document; `params` become `variables`
/// (values that parse as JSON keep their type). A non-empty method other than
/// `POST` is sent as `operationName`. A body that already is a JSON object
/// with a `query` field is sent unchanged.
#[derive(Debug, Clone)]
pub struct GraphqlExecutor {
    client: Arc<HttpClient>,
}

impl GraphqlExecutor {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

pub(crate) fn graphql_payload(request: &ResolvedRequest) -> Json {
    let body = request.body.as_deref().unwrap_or_default();
    if let Ok(Json::Object(obj)) = serde_json::from_str::<Json>(body)
        && obj.contains_key("query")
    {
        return Json::Object(obj);
    }

    let variables: Map<String, Json> = request
        .params
        .iter()
        .map(|(k, v)| {
            let value = serde_json::from_str(v).unwrap_or_else(|_| Json::String(v.clone()));
            (k.clone(), value)
        })
        .collect();

    let mut payload = json!({ "query": body, "variables": variables });
    let op = request.method.trim();
    if !op.is_empty() && !op.eq_ignore_ascii_case("post") {
        payload["operationName"] = Json::String(op.to_string());
    }
    payload
}

/// First entry of a non-empty `errors` array, if any.
pub(crate) fn graphql_error(body: &[u8]) -> Result<Option<String>, String> {
    let doc: Json =
        serde_json::from_slice(body).map_err(|e| format!("invalid GraphQL response: {e}"))?;
    let first = doc
        .get("errors")
        .and_then(Json::as_array)
        .and_then(|errors| errors.first());
    Ok(first.map(|err| {
        err.get("message")
            .and_then(Json::as_str)
            .map_or_else(|| err.to_string(), str::to_string)
    }))
}

#[async_trait]
impl ProtocolExecutor for GraphqlExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Graphql
    }

    async fn execute(&self, request: &ResolvedRequest, _scope: &ScopeView<'_>) -> Exchange {
        timed(request, async {
            let mut req = build_request(request, "POST")?;
            // GraphQL is always POSTed; the method slot names the operation.
            req.method = http::Method::POST;
            if !request.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                req.headers
                    .push(("content-type".to_string(), "application/json".to_string()));
            }
            let req = req.body(graphql_payload(request).to_string());

            let started = Instant::now();
            let res = self.client.send(req).await?;
            let mut exchange = exchange_from_response(request, res, started);
            if exchange.outcome.success {
                match graphql_error(&exchange.response.body) {
                    Ok(None) => {}
                    Ok(Some(message)) => {
                        exchange.outcome = exchange
                            .outcome
                            .with_failure(format!("GraphQL error: {message}"));
                    }
                    Err(message) => exchange.outcome = exchange.outcome.with_failure(message),
                }
            }
            Ok(exchange)
        })
        .await
    }
}
