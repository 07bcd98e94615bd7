use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use volley_http::HttpClient;

use super::{
    Connector, ConnectorExecutor, GraphqlExecutor, HttpExecutor, MqttExecutor, ProtocolExecutor,
    ProtocolKind, SoapExecutor, TcpExecutor, UdpExecutor,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported protocol `{0}`")]
pub struct UnsupportedProtocol(pub String);

/// Protocol name → executor, created on first use and cached.
///
/// All HTTP-based executors share one connection pool.
#[derive(Debug)]
pub struct ProtocolRegistry {
    executors: DashMap<ProtocolKind, Arc<dyn ProtocolExecutor>>,
    connectors: DashMap<ProtocolKind, Arc<dyn Connector>>,
    http: Arc<HttpClient>,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::with_http_client(Arc::new(HttpClient::default()))
    }
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self::with_http_client(Arc::new(HttpClient::new(Some(connect_timeout))))
    }

    pub fn with_http_client(http: Arc<HttpClient>) -> Self {
        Self {
            executors: DashMap::new(),
            connectors: DashMap::new(),
            http,
        }
    }

    /// Trim and case-fold a protocol name.
    pub fn parse(name: &str) -> Result<ProtocolKind, UnsupportedProtocol> {
        name.trim()
            .parse()
            .map_err(|_| UnsupportedProtocol(name.trim().to_string()))
    }

    /// Cached executor for `name`. Unknown names fail and leave the cache untouched.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProtocolExecutor>, UnsupportedProtocol> {
        Self::parse(name).map(|kind| self.executor(kind))
    }

    pub fn executor(&self, kind: ProtocolKind) -> Arc<dyn ProtocolExecutor> {
        if let Some(existing) = self.executors.get(&kind) {
            return existing.value().clone();
        }
        self.executors
            .entry(kind)
            .or_insert_with(|| self.build(kind))
            .value()
            .clone()
    }

    /// Replace whatever serves `executor.protocol()`.
    pub fn register(&self, executor: Arc<dyn ProtocolExecutor>) {
        self.executors.insert(executor.protocol(), executor);
    }

    #[must_use]
    pub fn with_executor(self, executor: Arc<dyn ProtocolExecutor>) -> Self {
        self.register(executor);
        self
    }

    /// Route `kind` through `connector`. This is how `jms` and `jdbc` get a
    /// transport; any other protocol can be redirected the same way.
    pub fn register_connector(&self, kind: ProtocolKind, connector: Arc<dyn Connector>) {
        self.connectors.insert(kind, connector);
        self.executors.remove(&kind);
    }

    #[must_use]
    pub fn with_connector(self, kind: ProtocolKind, connector: Arc<dyn Connector>) -> Self {
        self.register_connector(kind, connector);
        self
    }

    /// Number of executors currently cached.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    fn build(&self, kind: ProtocolKind) -> Arc<dyn ProtocolExecutor> {
        if let Some(connector) = self.connectors.get(&kind) {
            return Arc::new(ConnectorExecutor::new(kind, Some(connector.value().clone())));
        }

        match kind {
            ProtocolKind::Http | ProtocolKind::Https => {
                Arc::new(HttpExecutor::new(kind, self.http.clone()))
            }
            ProtocolKind::Graphql => Arc::new(GraphqlExecutor::new(self.http.clone())),
            ProtocolKind::Soap => Arc::new(SoapExecutor::new(self.http.clone())),
            ProtocolKind::Tcp => Arc::new(TcpExecutor),
            ProtocolKind::Udp => Arc::new(UdpExecutor),
            ProtocolKind::Mqtt => Arc::new(MqttExecutor::new()),
            ProtocolKind::Jms | ProtocolKind::Jdbc => Arc::new(ConnectorExecutor::new(kind, None)),
        }
    }
}
