//! LogRelay Receiver Example
//!
//! Runs a receiver on an ephemeral port, feeds it a few records and prints
//! what landed in the output file.

use logrelay::client::LogClient;
use logrelay::config::ServerConfig;
use logrelay::server::LogServer;
use logrelay::sink::LineFormat;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("logrelay=debug")
        .init();

    let dir = std::env::temp_dir().join("logrelay-demo");
    tokio::fs::create_dir_all(&dir).await?;

    let mut config = ServerConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.poll_interval_ms = 100;
    config.file.path = dir.join("server.log");
    config.file.format = LineFormat::Human;
    config.file.max_bytes = 512;

    let server = LogServer::new(config).await?;
    let listener = server.bind().await?;
    let handle = listener.handle();
    let addr = handle.local_addr().to_string();
    println!("Receiver listening on {}", addr);

    let accept_loop = tokio::spawn(listener.serve_until_stopped());

    let client = LogClient::connect(&addr, "demo.worker").await?;
    for i in 1..=10 {
        client.info(format!("Processing iteration {}", i)).await?;
    }
    client.close().await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop();
    accept_loop.await??;
    handle.drained().await;
    server.shutdown().await?;

    let contents = tokio::fs::read_to_string(dir.join("server.log")).await?;
    println!("Current file:\n{}", contents);
    if let Some(file) = server.file_sinks().get(&dir.join("server.log")) {
        println!("Archives: {:?}", file.rotation_state().await.rotated);
    }

    Ok(())
}
