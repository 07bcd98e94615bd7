use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use volley_metrics::RequestOutcome;

use super::{Exchange, ProtocolError, ProtocolExecutor, ProtocolKind, ResolvedRequest, timed};
use crate::response::ResponseContent;
use crate::scope::ScopeView;

/// What a connector backend returns for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorReply {
    /// Protocol-specific status (a SQL update count, a broker ack code, ...).
    pub status: Option<u16>,
    pub body: Bytes,
}

/// A pluggable backend for protocols without a native transport here
/// (`jms`, `jdbc`): a message-broker bridge, a SQL gateway, a test double.
///
/// Errors become failed outcomes like any transport error.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    async fn call(
        &self,
        request: &ResolvedRequest,
        scope: &ScopeView<'_>,
    ) -> Result<ConnectorReply, ProtocolError>;
}

/// Executor for connector-backed protocols. Without a registered connector
/// every call fails with [`ProtocolError::NoConnector`].
#[derive(Debug, Clone)]
pub struct ConnectorExecutor {
    kind: ProtocolKind,
    connector: Option<Arc<dyn Connector>>,
}

impl ConnectorExecutor {
    pub fn new(kind: ProtocolKind, connector: Option<Arc<dyn Connector>>) -> Self {
        Self { kind, connector }
    }

    pub fn has_connector(&self) -> bool {
        self.connector.is_some()
    }
}

#[async_trait]
impl ProtocolExecutor for ConnectorExecutor {
    fn protocol(&self) -> ProtocolKind {
        self.kind
    }

    async fn execute(&self, request: &ResolvedRequest, scope: &ScopeView<'_>) -> Exchange {
        timed(request, async {
            let connector = self
                .connector
                .as_ref()
                .ok_or(ProtocolError::NoConnector(self.kind))?;

            let started = Instant::now();
            let reply = connector.call(request, scope).await?;
            let outcome = RequestOutcome::success(
                request.name.clone(),
                reply.status,
                started.elapsed(),
                reply.body.len() as u64,
            )
            .with_bytes_sent(request.body_bytes().len() as u64);

            Ok(Exchange::new(
                outcome,
                ResponseContent {
                    status: reply.status,
                    headers: Vec::new(),
                    body: reply.body,
                },
            ))
        })
        .await
    }
}
