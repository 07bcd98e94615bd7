//! Protocol executors and the registry that hands them out.
//!
//! The protocol set is closed: [`ProtocolKind`] lists every identifier a
//! scenario may use and the registry's factory matches on it exhaustively.
//! Callers only ever see `Arc<dyn ProtocolExecutor>`.

mod connector;
mod graphql;
mod http;
mod mqtt;
mod registry;
mod soap;
mod socket;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use volley_metrics::RequestOutcome;

use crate::response::ResponseContent;
use crate::scope::ScopeView;

pub use connector::{Connector, ConnectorReply, ConnectorExecutor};
pub use graphql::GraphqlExecutor;
pub use http::HttpExecutor;
pub use mqtt::MqttExecutor;
pub use registry::{ProtocolRegistry, UnsupportedProtocol};
pub use soap::SoapExecutor;
pub use socket::{TcpExecutor, UdpExecutor};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProtocolKind {
    Http,
    Https,
    Tcp,
    Udp,
    Mqtt,
    Jms,
    Jdbc,
    Graphql,
    Soap,
}

impl ProtocolKind {
    pub const ALL: [Self; 9] = [
        Self::Http,
        Self::Https,
        Self::Tcp,
        Self::Udp,
        Self::Mqtt,
        Self::Jms,
        Self::Jdbc,
        Self::Graphql,
        Self::Soap,
    ];

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// A request with every template already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub name: Arc<str>,
    pub protocol: ProtocolKind,
    pub endpoint: String,
    pub method: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ResolvedRequest {
    pub fn new(name: impl Into<Arc<str>>, protocol: ProtocolKind, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol,
            endpoint: endpoint.into(),
            method: String::new(),
            body: None,
            headers: Vec::new(),
            params: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().map(str::as_bytes).unwrap_or_default()
    }
}

/// One finished interaction: the outcome to record plus whatever came back,
/// for assertions and extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub outcome: RequestOutcome,
    pub response: ResponseContent,
}

impl Exchange {
    pub fn new(outcome: RequestOutcome, response: ResponseContent) -> Self {
        Self { outcome, response }
    }

    /// A request that never produced a response.
    pub fn failed(name: Arc<str>, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            outcome: RequestOutcome::failure(name, elapsed, error),
            response: ResponseContent::default(),
        }
    }
}

/// Transport-level failures. Executors turn these into failed outcomes; they
/// never reach the runner as errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Http(#[from] volley_http::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid method `{0}`")]
    InvalidMethod(String),

    #[error("mqtt: {0}")]
    Mqtt(String),

    #[error("no connector registered for `{0}`")]
    NoConnector(ProtocolKind),

    #[error("connector error: {0}")]
    Connector(String),
}

impl ProtocolError {
    /// Short classification for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(err) => err.transport_error_kind().into(),
            Self::Io(_) => "io",
            Self::Timeout(_) => "timeout",
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::InvalidMethod(_) => "invalid_method",
            Self::Mqtt(_) => "mqtt",
            Self::NoConnector(_) => "no_connector",
            Self::Connector(_) => "connector",
        }
    }

    pub(crate) fn endpoint(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

/// The uniform capability every protocol implements.
///
/// `execute` never fails: connection failures, timeouts and protocol faults
/// come back as an `Exchange` whose outcome has `success == false`.
#[async_trait]
pub trait ProtocolExecutor: Send + Sync + fmt::Debug {
    fn protocol(&self) -> ProtocolKind;

    /// `scope` is the caller's variable view for this request; executors may
    /// read connection settings from it.
    async fn execute(&self, request: &ResolvedRequest, scope: &ScopeView<'_>) -> Exchange;
}

/// Run `call` under the request timeout and convert any error into a failed
/// exchange timed from the start of the call.
pub(crate) async fn timed<F>(request: &ResolvedRequest, call: F) -> Exchange
where
    F: Future<Output = Result<Exchange, ProtocolError>>,
{
    let started = Instant::now();
    let result = match tokio::time::timeout(request.timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout(request.timeout)),
    };

    match result {
        Ok(exchange) => exchange,
        Err(err) => {
            tracing::debug!(
                request = %request.name,
                kind = err.kind(),
                error = %err,
                "request failed"
            );
            Exchange::failed(request.name.clone(), started.elapsed(), err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("HTTP".parse::<ProtocolKind>().unwrap(), ProtocolKind::Http);
        assert_eq!("GraphQL".parse::<ProtocolKind>().unwrap(), ProtocolKind::Graphql);
        assert!("ftp".parse::<ProtocolKind>().is_err());
        for kind in ProtocolKind::ALL {
            assert_eq!(kind.as_str().parse::<ProtocolKind>().unwrap(), kind);
        }
    }

    #[test]
    fn errors_carry_a_log_kind() {
        assert_eq!(ProtocolError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(ProtocolError::NoConnector(ProtocolKind::Jms).kind(), "no_connector");
        let http = ProtocolError::from(volley_http::Error::InvalidUrl("x".to_string()));
        assert_eq!(http.kind(), "invalid_url");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_converts_timeouts_into_failed_outcomes() {
        let mut request = ResolvedRequest::new("slow", ProtocolKind::Tcp, "tcp://127.0.0.1:1");
        request.timeout = Duration::from_millis(100);

        let exchange = timed(&request, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Exchange::failed(Arc::from("never"), Duration::ZERO, "unreachable"))
        })
        .await;

        assert!(!exchange.outcome.success);
        assert_eq!(&*exchange.outcome.request_name, "slow");
        assert!(
            exchange
                .outcome
                .error
                .as_deref()
                .is_some_and(|e| e.contains("timed out"))
        );
        assert!(exchange.outcome.elapsed >= Duration::from_millis(100));
    }
}
