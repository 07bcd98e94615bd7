use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;

/// Raw TCP and UDP echo listeners on ephemeral loopback ports.
///
/// The TCP side echoes every chunk it reads until the peer closes; the UDP
/// side answers each datagram with the same bytes.
pub struct EchoSockets {
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    tcp_bytes: Arc<AtomicU64>,
    udp_datagrams: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl EchoSockets {
    pub async fn start() -> std::io::Result<Self> {
        let tcp = TcpListener::bind("127.0.0.1:0").await?;
        let udp = UdpSocket::bind("127.0.0.1:0").await?;
        let tcp_addr = tcp.local_addr()?;
        let udp_addr = udp.local_addr()?;

        let tcp_bytes = Arc::new(AtomicU64::new(0));
        let udp_datagrams = Arc::new(AtomicU64::new(0));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let tcp_counter = tcp_bytes.clone();
        let udp_counter = udp_datagrams.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = tcp.accept() => {
                        if let Ok((stream, _)) = accepted {
                            tokio::spawn(echo_tcp(stream, tcp_counter.clone()));
                        }
                    }
                    received = udp.recv_from(&mut buf) => {
                        if let Ok((n, peer)) = received {
                            udp_counter.fetch_add(1, Ordering::Relaxed);
                            let _ = udp.send_to(&buf[..n], peer).await;
                        }
                    }
                }
            }
        });

        Ok(Self {
            tcp_addr,
            udp_addr,
            tcp_bytes,
            udp_datagrams,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn tcp_url(&self) -> String {
        format!("tcp://{}", self.tcp_addr)
    }

    pub fn udp_url(&self) -> String {
        format!("udp://{}", self.udp_addr)
    }

    pub fn tcp_bytes(&self) -> u64 {
        self.tcp_bytes.load(Ordering::Relaxed)
    }

    pub fn udp_datagrams(&self) -> u64 {
        self.udp_datagrams.load(Ordering::Relaxed)
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

impl Drop for EchoSockets {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn echo_tcp(mut stream: tokio::net::TcpStream, counter: Arc<AtomicU64>) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                counter.fetch_add(n as u64, Ordering::Relaxed);
                if stream.write_all(&buf[..n]).await.is_err() {
                    return;
                }
            }
        }
    }
}
