use std::net::SocketAddr;

use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "-h" | "--help" => {
                eprintln!(
                    "volley-testserver\n\nUSAGE:\n  volley-testserver [--bind 127.0.0.1:0]\n\nOUTPUT:\n  Prints HTTP_URL, TCP_URL, UDP_URL and MQTT_URL to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let sockets = volley_testserver::EchoSockets::start().await?;
    let broker = volley_testserver::MqttTestBroker::start().await?;

    let stats = volley_testserver::TestServerStats::default();
    let app = volley_testserver::router(stats);

    println!("HTTP_URL=http://{addr}");
    println!("TCP_URL={}", sockets.tcp_url());
    println!("UDP_URL={}", sockets.udp_url());
    println!("MQTT_URL={}", broker.url());

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    serve.await?;

    sockets.shutdown().await;
    broker.shutdown().await;
    Ok(())
}
