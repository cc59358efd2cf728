//! Integration tests for LogRelay

use logrelay::client::LogClient;
use logrelay::codec::encode;
use logrelay::config::ServerConfig;
use logrelay::server::{ListenerHandle, LogServer};
use logrelay::sink::{DispatchSink, MemorySink, RecordSink, Route, ROOT_LOGGER};
use logrelay::types::{Extras, LogLevel, LogRecord};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Helper function to create a test server config
fn create_test_server_config(log_path: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.poll_interval_ms = 50;
    config.file.enabled = true;
    config.file.path = log_path.to_path_buf();
    config.file.max_bytes = 0;
    config
}

/// Bind the server and run its accept loop in the background
async fn start(server: &LogServer) -> (ListenerHandle, JoinHandle<logrelay::Result<()>>) {
    let listener = server.bind().await.unwrap();
    let handle = listener.handle();
    (handle, tokio::spawn(listener.serve_until_stopped()))
}

async fn stop(server: &LogServer, handle: ListenerHandle, task: JoinHandle<logrelay::Result<()>>) {
    handle.stop();
    task.await.unwrap().unwrap();
    timeout(Duration::from_secs(2), handle.drained()).await.unwrap();
    server.shutdown().await.unwrap();
}

fn read_records(content: &str) -> Vec<LogRecord> {
    content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Test basic client-server communication
#[tokio::test]
async fn test_basic_logging() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("logs").join("server.jsonl");

    let server = LogServer::new(create_test_server_config(&log_path)).await.unwrap();
    let (handle, task) = start(&server).await;

    let client = LogClient::connect(&handle.local_addr().to_string(), "myapp.area1")
        .await
        .unwrap();

    client.debug("Debug message").await.unwrap();
    client.info("Info message").await.unwrap();
    client.warning("Warning message").await.unwrap();
    client.error("Error message").await.unwrap();
    client.critical("Critical message").await.unwrap();

    let mut extra = Extras::new();
    extra.insert("even_more".to_string(), 14.8.into());
    extra.insert("user".to_string(), "john".into());
    client
        .exception("exception message", "ZeroDivisionError: division by zero", extra)
        .await
        .unwrap();
    client.close().await.unwrap();

    sleep(Duration::from_millis(100)).await;
    stop(&server, handle, task).await;

    let content = fs::read_to_string(&log_path).await.unwrap();
    let records = read_records(&content);
    assert_eq!(records.len(), 6);

    let levels: Vec<LogLevel> = records.iter().map(|r| r.level).collect();
    assert_eq!(
        levels,
        vec![
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical,
            LogLevel::Error,
        ]
    );
    assert!(records.iter().all(|r| r.name == "myapp.area1"));

    let last = &records[5];
    assert_eq!(last.exc_text.as_deref(), Some("ZeroDivisionError: division by zero"));
    assert_eq!(last.extra.get("user"), Some(&"john".into()));
    assert_eq!(last.extra.get("even_more"), Some(&14.8.into()));
}

/// A broken connection must not disturb a healthy one
#[tokio::test]
async fn test_malformed_connection_is_isolated() {
    let sink = Arc::new(MemorySink::new());
    let server = LogServer::with_sink(create_test_server_config(Path::new("unused.jsonl")), sink.clone());
    let (handle, task) = start(&server).await;
    let addr = handle.local_addr();

    let mut bad = TcpStream::connect(addr).await.unwrap();
    bad.write_all(b"\x00\x00\x00\x0cnot a record").await.unwrap();

    let mut good = TcpStream::connect(addr).await.unwrap();
    let sent: Vec<LogRecord> = (0..100)
        .map(|i| LogRecord::new("myapp", LogLevel::Info, format!("message {}", i)).with_extra("seq", i as i64))
        .collect();
    for record in &sent {
        good.write_all(&encode(record).unwrap()).await.unwrap();
    }
    drop(good);
    drop(bad);

    assert!(sink.wait_for(100, Duration::from_secs(5)).await);
    stop(&server, handle, task).await;

    assert_eq!(sink.records(), sent);
}

/// A connection that closes inside the length prefix delivers nothing
#[tokio::test]
async fn test_short_prefix_delivers_nothing() {
    let sink = Arc::new(MemorySink::new());
    let server = LogServer::with_sink(create_test_server_config(Path::new("unused.jsonl")), sink.clone());
    let (handle, task) = start(&server).await;

    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
    stream.write_all(&[0x00, 0x00]).await.unwrap();
    drop(stream);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.accepted_connections(), 1);
    stop(&server, handle, task).await;

    assert!(sink.is_empty());
}

/// Records from hierarchical loggers reach the sinks registered on their parents
#[tokio::test]
async fn test_hierarchical_routing() {
    let app_sink = Arc::new(MemorySink::new());
    let root_sink = Arc::new(MemorySink::new());
    let dispatch = DispatchSink::new();
    dispatch.route("myapp", Route::new(app_sink.clone()).with_min_level(LogLevel::Warning));
    dispatch.route(ROOT_LOGGER, Route::new(root_sink.clone()));

    let server = LogServer::with_sink(
        create_test_server_config(Path::new("unused.jsonl")),
        Arc::new(dispatch) as Arc<dyn RecordSink>,
    );
    let (handle, task) = start(&server).await;
    let addr = handle.local_addr().to_string();

    let area1 = LogClient::connect(&addr, "myapp.area1").await.unwrap();
    let other = LogClient::connect(&addr, "other").await.unwrap();
    area1.info("How quickly daft jumping zebras vex.").await.unwrap();
    area1.warning("Jail zesty vixen who grabbed pay from quack.").await.unwrap();
    other.error("unrelated").await.unwrap();
    area1.close().await.unwrap();
    other.close().await.unwrap();

    assert!(root_sink.wait_for(3, Duration::from_secs(5)).await);
    stop(&server, handle, task).await;

    let app: Vec<String> = app_sink.records().into_iter().map(|r| r.msg).collect();
    assert_eq!(app, vec!["Jail zesty vixen who grabbed pay from quack."]);
    assert_eq!(root_sink.len(), 3);
}

/// Stopping the listener refuses new connections but lets open ones finish
#[tokio::test]
async fn test_cooperative_stop() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("server.jsonl");
    let server = LogServer::new(create_test_server_config(&log_path)).await.unwrap();
    let (handle, task) = start(&server).await;
    let addr = handle.local_addr();

    let client = LogClient::connect(&addr.to_string(), "myapp").await.unwrap();
    client.info("before stop").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    handle.stop();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap().unwrap();
    assert!(TcpStream::connect(addr).await.is_err());

    client.info("after stop").await.unwrap();
    client.close().await.unwrap();
    timeout(Duration::from_secs(2), handle.drained()).await.unwrap();
    server.shutdown().await.unwrap();

    let content = fs::read_to_string(&log_path).await.unwrap();
    let messages: Vec<String> = read_records(&content).into_iter().map(|r| r.msg).collect();
    assert_eq!(messages, vec!["before stop", "after stop"]);
}

/// `run_until` serves until the shutdown future completes
#[tokio::test]
async fn test_run_until_shutdown_signal() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("server.jsonl");

    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let mut config = create_test_server_config(&log_path);
    config.server.port = port;
    let addr = config.server.bind_addr();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = LogServer::new(config).await.unwrap();
    let server_task = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let mut client = None;
    for _ in 0..50 {
        if let Ok(c) = LogClient::connect(&addr, "myapp").await {
            client = Some(c);
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    let client = client.expect("server never started listening");
    client.info("Jackdaws love my big sphinx of quartz.").await.unwrap();
    client.close().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), server_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let content = fs::read_to_string(&log_path).await.unwrap();
    let records = read_records(&content);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].msg, "Jackdaws love my big sphinx of quartz.");
}

/// Binding a port that is already in use reports a bind failure
#[tokio::test]
async fn test_bind_failure() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = create_test_server_config(Path::new("unused.jsonl"));
    config.server.port = taken.local_addr().unwrap().port();

    let server = LogServer::with_sink(config, Arc::new(MemorySink::new()));
    let err = server.run_until(async {}).await.unwrap_err();
    assert!(matches!(err, logrelay::RelayError::BindFailure { .. }));
}
