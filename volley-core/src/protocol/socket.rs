use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;
use volley_metrics::RequestOutcome;

use super::{Exchange, ProtocolError, ProtocolExecutor, ProtocolKind, ResolvedRequest, timed};
use crate::response::ResponseContent;
use crate::scope::ScopeView;

/// Method that writes the payload without waiting for a reply.
const SEND_ONLY: &str = "send";
const MAX_DATAGRAM: usize = 64 * 1024;

/// `tcp://host:port`, `udp://host:port` or a bare `host:port`.
pub(crate) fn socket_target(endpoint: &str, kind: ProtocolKind) -> Result<(String, u16), ProtocolError> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("{kind}://{endpoint}")
    };
    let url = url::Url::parse(&with_scheme)
        .map_err(|e| ProtocolError::endpoint(endpoint, e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProtocolError::endpoint(endpoint, "missing host"))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port()
        .ok_or_else(|| ProtocolError::endpoint(endpoint, "missing port"))?;
    Ok((host, port))
}

async fn resolve(endpoint: &str, kind: ProtocolKind) -> Result<SocketAddr, ProtocolError> {
    let (host, port) = socket_target(endpoint, kind)?;
    tokio::net::lookup_host((host.as_str(), port))
        .await?
        .next()
        .ok_or_else(|| ProtocolError::endpoint(endpoint, "host did not resolve"))
}

fn is_send_only(request: &ResolvedRequest) -> bool {
    request.method.trim().eq_ignore_ascii_case(SEND_ONLY)
}

fn socket_exchange(request: &ResolvedRequest, started: Instant, reply: Vec<u8>) -> Exchange {
    let received = reply.len() as u64;
    let outcome = RequestOutcome::success(request.name.clone(), None, started.elapsed(), received)
        .with_bytes_sent(request.body_bytes().len() as u64);
    Exchange::new(
        outcome,
        ResponseContent {
            status: None,
            headers: Vec::new(),
            body: Bytes::from(reply),
        },
    )
}

/// Writes the body, half-closes, then reads the reply until the peer closes.
#[derive(Debug, Clone, Default)]
pub struct TcpExecutor;

#[async_trait]
impl ProtocolExecutor for TcpExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Tcp
    }

    async fn execute(&self, request: &ResolvedRequest, _scope: &ScopeView<'_>) -> Exchange {
        timed(request, async {
            let addr = resolve(&request.endpoint, ProtocolKind::Tcp).await?;
            let started = Instant::now();
            let mut stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            stream.write_all(request.body_bytes()).await?;
            stream.shutdown().await?;

            let mut reply = Vec::new();
            if !is_send_only(request) {
                stream.read_to_end(&mut reply).await?;
            }
            Ok(socket_exchange(request, started, reply))
        })
        .await
    }
}

/// Sends one datagram and waits for one reply.
#[derive(Debug, Clone, Default)]
pub struct UdpExecutor;

#[async_trait]
impl ProtocolExecutor for UdpExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Udp
    }

    async fn execute(&self, request: &ResolvedRequest, _scope: &ScopeView<'_>) -> Exchange {
        timed(request, async {
            let addr = resolve(&request.endpoint, ProtocolKind::Udp).await?;
            let local: SocketAddr = if addr.is_ipv4() {
                SocketAddr::from(([0, 0, 0, 0], 0))
            } else {
                SocketAddr::from(([0u16; 8], 0))
            };

            let started = Instant::now();
            let socket = UdpSocket::bind(local).await?;
            socket.connect(addr).await?;
            socket.send(request.body_bytes()).await?;

            let mut reply = Vec::new();
            if !is_send_only(request) {
                reply.resize(MAX_DATAGRAM, 0);
                let n = socket.recv(&mut reply).await?;
                reply.truncate(n);
            }
            Ok(socket_exchange(request, started, reply))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_targets_with_and_without_scheme() {
        assert_eq!(
            socket_target("tcp://127.0.0.1:9000", ProtocolKind::Tcp).unwrap(),
            ("127.0.0.1".to_string(), 9000)
        );
        assert_eq!(
            socket_target("localhost:53", ProtocolKind::Udp).unwrap(),
            ("localhost".to_string(), 53)
        );
        assert_eq!(
            socket_target("tcp://[::1]:7", ProtocolKind::Tcp).unwrap(),
            ("::1".to_string(), 7)
        );
        assert!(socket_target("tcp://127.0.0.1", ProtocolKind::Tcp).is_err());
        assert!(socket_target("tcp://host:notaport", ProtocolKind::Tcp).is_err());
    }
}
