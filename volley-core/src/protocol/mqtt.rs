use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use volley_metrics::RequestOutcome;

use super::{Exchange, ProtocolError, ProtocolExecutor, ProtocolKind, ResolvedRequest, timed};
use crate::response::ResponseContent;
use crate::scope::ScopeView;

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE_SECS: u16 = 30;

mod codec {
    use super::*;

    pub const CONNECT: u8 = 0x10;
    pub const CONNACK: u8 = 0x20;
    pub const PUBLISH: u8 = 0x30;
    pub const PUBACK: u8 = 0x40;
    pub const DISCONNECT: u8 = 0xE0;

    const MAX_REMAINING: usize = 268_435_455;
    /// Largest packet accepted from the broker. Only CONNACK and PUBACK
    /// (2 bytes each) are expected back.
    const MAX_INBOUND: usize = 64 * 1024;

    pub fn put_remaining_length(buf: &mut BytesMut, mut len: usize) {
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            buf.put_u8(byte);
            if len == 0 {
                break;
            }
        }
    }

    fn put_str(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
        let len = u16::try_from(s.len())
            .map_err(|_| ProtocolError::Mqtt(format!("string too long ({} bytes)", s.len())))?;
        buf.put_u16(len);
        buf.put_slice(s.as_bytes());
        Ok(())
    }

    fn packet(header: u8, body: &[u8]) -> Result<Bytes, ProtocolError> {
        if body.len() > MAX_REMAINING {
            return Err(ProtocolError::Mqtt("packet too large".to_string()));
        }
        let mut buf = BytesMut::with_capacity(body.len() + 5);
        buf.put_u8(header);
        put_remaining_length(&mut buf, body.len());
        buf.put_slice(body);
        Ok(buf.freeze())
    }

    pub struct Connect<'a> {
        pub client_id: &'a str,
        pub username: Option<&'a str>,
        pub password: Option<&'a str>,
        pub keep_alive: u16,
    }

    pub fn connect(c: &Connect<'_>) -> Result<Bytes, ProtocolError> {
        let mut body = BytesMut::new();
        put_str(&mut body, "MQTT")?;
        body.put_u8(4); // protocol level 3.1.1

        let mut flags = 0x02; // clean session
        if c.username.is_some() {
            flags |= 0x80;
        }
        if c.password.is_some() {
            flags |= 0x40;
        }
        body.put_u8(flags);
        body.put_u16(c.keep_alive);

        put_str(&mut body, c.client_id)?;
        if let Some(u) = c.username {
            put_str(&mut body, u)?;
        }
        if let Some(p) = c.password {
            put_str(&mut body, p)?;
        }
        packet(CONNECT, &body)
    }

    pub fn publish(
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
        packet_id: u16,
    ) -> Result<Bytes, ProtocolError> {
        let mut body = BytesMut::with_capacity(topic.len() + payload.len() + 4);
        put_str(&mut body, topic)?;
        if qos > 0 {
            body.put_u16(packet_id);
        }
        body.put_slice(payload);
        let header = PUBLISH | (qos << 1) | u8::from(retain);
        packet(header, &body)
    }

    pub fn disconnect() -> Bytes {
        Bytes::from_static(&[DISCONNECT, 0x00])
    }

    /// Read one packet: the fixed header byte and the variable part.
    pub async fn read_packet<R>(stream: &mut R) -> Result<(u8, Vec<u8>), ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let header = stream.read_u8().await?;
        let mut remaining = 0usize;
        let mut multiplier = 1usize;
        for _ in 0..4 {
            let byte = stream.read_u8().await?;
            remaining += usize::from(byte & 0x7F) * multiplier;
            if byte & 0x80 == 0 {
                if remaining > MAX_INBOUND {
                    return Err(ProtocolError::Mqtt(format!(
                        "packet of {remaining} bytes exceeds the {MAX_INBOUND} byte limit"
                    )));
                }
                let mut body = vec![0u8; remaining];
                stream.read_exact(&mut body).await?;
                return Ok((header, body));
            }
            multiplier *= 128;
        }
        Err(ProtocolError::Mqtt("malformed remaining length".to_string()))
    }

    pub fn connack_reason(code: u8) -> &'static str {
        match code {
            0 => "accepted",
            1 => "unacceptable protocol version",
            2 => "identifier rejected",
            3 => "server unavailable",
            4 => "bad user name or password",
            5 => "not authorized",
            _ => "unknown return code",
        }
    }
}

/// MQTT 3.1.1 publisher: CONNECT, one PUBLISH (QoS 0 or 1), DISCONNECT.
///
/// The topic comes from the `topic` param or the endpoint path
/// (`mqtt://broker:1883/sensors/temp`). Other params: `qos`, `retain`,
/// `clientId`, `username`, `password` (credentials may also sit in the URL).
#[derive(Debug, Default)]
pub struct MqttExecutor {
    next_packet_id: AtomicU16,
}

impl MqttExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn packet_id(&self) -> u16 {
        loop {
            let id = self.next_packet_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }

    async fn publish(&self, request: &ResolvedRequest) -> Result<Exchange, ProtocolError> {
        let endpoint = &request.endpoint;
        let url = url::Url::parse(endpoint)
            .map_err(|e| ProtocolError::endpoint(endpoint, e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| ProtocolError::endpoint(endpoint, "missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let topic = match request.param("topic") {
            Some(t) => t.to_string(),
            None => url.path().trim_start_matches('/').to_string(),
        };
        if topic.is_empty() {
            return Err(ProtocolError::endpoint(endpoint, "missing topic"));
        }

        let qos = match request.param("qos").map(str::trim) {
            None | Some("0") => 0,
            Some("1") => 1,
            Some(other) => {
                return Err(ProtocolError::Mqtt(format!("unsupported QoS `{other}`")));
            }
        };
        let retain = request
            .param("retain")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let generated_id;
        let client_id = match request.param("clientId") {
            Some(id) => id,
            None => {
                generated_id = format!("volley-{}", uuid::Uuid::new_v4().simple());
                generated_id.as_str()
            }
        };
        let username = request
            .param("username")
            .or_else(|| Some(url.username()).filter(|u| !u.is_empty()));
        let password = request.param("password").or_else(|| url.password());

        let started = Instant::now();
        let mut stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;

        let connect = codec::connect(&codec::Connect {
            client_id,
            username,
            password,
            keep_alive: KEEP_ALIVE_SECS,
        })?;
        let packet_id = if qos > 0 { self.packet_id() } else { 0 };
        let publish = codec::publish(&topic, request.body_bytes(), qos, retain, packet_id)?;
        let disconnect = codec::disconnect();

        let mut sent = connect.len() as u64;
        let mut received = 0u64;

        stream.write_all(&connect).await?;
        let (header, body) = codec::read_packet(&mut stream).await?;
        received += 2 + body.len() as u64;
        if header & 0xF0 != codec::CONNACK || body.len() < 2 {
            return Err(ProtocolError::Mqtt("expected CONNACK".to_string()));
        }
        if body[1] != 0 {
            return Err(ProtocolError::Mqtt(format!(
                "connection refused: {} ({})",
                codec::connack_reason(body[1]),
                body[1]
            )));
        }

        stream.write_all(&publish).await?;
        sent += publish.len() as u64;

        if qos == 1 {
            let want = packet_id.to_be_bytes();
            loop {
                let (header, body) = codec::read_packet(&mut stream).await?;
                received += 2 + body.len() as u64;
                if header & 0xF0 == codec::PUBACK && body.get(..2) == Some(&want[..]) {
                    break;
                }
            }
        }

        stream.write_all(&disconnect).await?;
        sent += disconnect.len() as u64;

        let outcome = RequestOutcome::success(request.name.clone(), None, started.elapsed(), received)
            .with_bytes_sent(sent);
        Ok(Exchange::new(outcome, ResponseContent::default()))
    }
}

#[async_trait]
impl ProtocolExecutor for MqttExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Mqtt
    }

    async fn execute(&self, request: &ResolvedRequest, _scope: &ScopeView<'_>) -> Exchange {
        timed(request, self.publish(request)).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::codec::*;
    use super::*;

    #[test]
    fn remaining_length_uses_varint_encoding() {
        let cases: [(usize, &[u8]); 4] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xFF, 0x7F]),
        ];
        for (len, want) in cases {
            let mut buf = BytesMut::new();
            put_remaining_length(&mut buf, len);
            assert_eq!(&buf[..], want, "len {len}");
        }
    }

    #[tokio::test]
    async fn read_packet_parses_acks_and_rejects_oversized_lengths() {
        let mut puback: &[u8] = &[PUBACK, 0x02, 0x01, 0x02];
        let (header, body) = read_packet(&mut puback).await.unwrap();
        assert_eq!(header, PUBACK);
        assert_eq!(body, vec![0x01, 0x02]);

        // Declares 256 MiB - 1 with no body behind it.
        let mut huge: &[u8] = &[PUBLISH, 0xFF, 0xFF, 0xFF, 0x7F];
        let err = read_packet(&mut huge).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Mqtt(ref m) if m.contains("exceeds")), "{err}");

        let mut truncated: &[u8] = &[CONNACK, 0x02, 0x00];
        assert!(matches!(read_packet(&mut truncated).await, Err(ProtocolError::Io(_))));
    }

    #[test]
    fn connect_packet_layout() {
        let pkt = connect(&Connect {
            client_id: "c1",
            username: Some("u"),
            password: None,
            keep_alive: 30,
        })
        .unwrap();
        assert_eq!(
            &pkt[..],
            &[
                0x10, 17, // fixed header
                0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x82, 0x00, 30, // variable header
                0x00, 0x02, b'c', b'1', 0x00, 0x01, b'u', // payload
            ]
        );
    }

    #[test]
    fn publish_packet_layout() {
        let qos0 = publish("a/b", b"hi", 0, false, 0).unwrap();
        assert_eq!(&qos0[..], &[0x30, 7, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']);

        let qos1 = publish("t", b"", 1, true, 0x0102).unwrap();
        assert_eq!(&qos1[..], &[0x33, 5, 0x00, 0x01, b't', 0x01, 0x02]);
    }
}
