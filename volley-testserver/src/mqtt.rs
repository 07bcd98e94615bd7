use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, oneshot};

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

/// Client id that the broker refuses with CONNACK return code 5.
pub const REJECTED_CLIENT_ID: &str = "rejected-client";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
}

/// Minimal MQTT 3.1.1 broker: accepts CONNECT, records PUBLISH, answers
/// QoS 1 with PUBACK and PINGREQ with PINGRESP. No subscriptions.
pub struct MqttTestBroker {
    addr: SocketAddr,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl MqttTestBroker {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let published = Arc::new(Mutex::new(Vec::new()));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let sink = published.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            tokio::spawn(serve_client(stream, sink.clone()));
                        }
                    }
                }
            }
        });

        Ok(Self {
            addr,
            published,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("mqtt://{}", self.addr)
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MqttTestBroker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;

    let mut remaining = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        remaining |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 21 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "malformed remaining length",
            ));
        }
    }

    let mut body = vec![0u8; remaining];
    stream.read_exact(&mut body).await?;
    Ok((header, body))
}

fn take_str(body: &[u8], at: usize) -> Option<(String, usize)> {
    let len = usize::from(u16::from_be_bytes([*body.get(at)?, *body.get(at + 1)?]));
    let end = at + 2 + len;
    let s = std::str::from_utf8(body.get(at + 2..end)?).ok()?;
    Some((s.to_string(), end))
}

fn connect_client_id(body: &[u8]) -> Option<String> {
    // protocol name, level(1), flags(1), keep-alive(2), then client id
    let (_, after_name) = take_str(body, 0)?;
    take_str(body, after_name + 4).map(|(id, _)| id)
}

async fn serve_client(mut stream: TcpStream, sink: Arc<Mutex<Vec<PublishedMessage>>>) {
    loop {
        let Ok((header, body)) = read_packet(&mut stream).await else {
            return;
        };

        let result = match header & 0xF0 {
            CONNECT => {
                let code = match connect_client_id(&body) {
                    Some(id) if id == REJECTED_CLIENT_ID => 0x05,
                    Some(_) => 0x00,
                    None => 0x02,
                };
                stream.write_all(&[CONNACK, 0x02, 0x00, code]).await
            }
            PUBLISH => {
                let qos = (header >> 1) & 0x03;
                let Some((topic, mut at)) = take_str(&body, 0) else {
                    return;
                };
                let mut packet_id = None;
                if qos > 0 {
                    let (Some(hi), Some(lo)) = (body.get(at), body.get(at + 1)) else {
                        return;
                    };
                    packet_id = Some([*hi, *lo]);
                    at += 2;
                }
                sink.lock().await.push(PublishedMessage {
                    topic,
                    payload: body.get(at..).unwrap_or_default().to_vec(),
                    qos,
                });
                match packet_id {
                    Some([hi, lo]) => stream.write_all(&[PUBACK, 0x02, hi, lo]).await,
                    None => Ok(()),
                }
            }
            PINGREQ => stream.write_all(&[PINGRESP, 0x00]).await,
            DISCONNECT => return,
            _ => return,
        };

        if result.is_err() {
            return;
        }
    }
}
