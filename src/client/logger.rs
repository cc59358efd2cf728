//! Producer client that streams framed records to a LogRelay receiver

use crate::codec::FrameCodec;
use crate::config::ClientConfig;
use crate::types::{Extras, LogLevel, LogRecord, SourceLocation};
use crate::{RelayError, Result};
use futures::SinkExt;
use std::future::Future;
use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tokio_util::codec::FramedWrite;

type Connection = FramedWrite<TcpStream, FrameCodec>;

/// Client for sending log records to a LogRelay server.
///
/// Level shortcuts stamp the caller's file and line into the record.
#[derive(Clone)]
pub struct LogClient {
    config: ClientConfig,
    connection: Arc<Mutex<Option<Connection>>>,
    hostname: String,
}

impl LogClient {
    /// Connect to `server_addr`, stamping records with `logger_name`
    pub async fn connect(server_addr: &str, logger_name: &str) -> Result<Self> {
        let config = ClientConfig {
            server_addr: server_addr.to_string(),
            logger_name: logger_name.to_string(),
            ..Default::default()
        };

        Self::with_config(config).await
    }

    /// Create a client with custom configuration
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let hostname = gethostname::gethostname().to_string_lossy().to_string();

        let client = Self {
            config,
            connection: Arc::new(Mutex::new(None)),
            hostname,
        };

        client.ensure_connected().await?;
        Ok(client)
    }

    /// Logger name stamped on records
    pub fn logger_name(&self) -> &str {
        &self.config.logger_name
    }

    async fn ensure_connected(&self) -> Result<()> {
        let mut conn_guard = self.connection.lock().await;
        if conn_guard.is_none() {
            *conn_guard = Some(self.open_connection().await?);
        }
        Ok(())
    }

    async fn open_connection(&self) -> Result<Connection> {
        let connect_future = TcpStream::connect(&self.config.server_addr);
        let stream = timeout(Duration::from_secs(self.config.timeout_seconds), connect_future)
            .await
            .map_err(|_| RelayError::Connection("Connection timeout".to_string()))?
            .map_err(|e| RelayError::Connection(format!("Failed to connect: {}", e)))?;
        stream.set_nodelay(true)?;

        Ok(FramedWrite::new(stream, FrameCodec::new(self.config.max_frame_size)))
    }

    /// Build a record from this client, stamped with the caller's location.
    ///
    /// The caller's function name is not available at runtime, so `func_name`
    /// is left empty; use [`LogClient::log_at`] to supply a full location.
    #[track_caller]
    pub fn record(&self, level: LogLevel, message: &str) -> LogRecord {
        let caller = Location::caller();
        let module = Path::new(caller.file())
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut record = LogRecord::new(self.config.logger_name.clone(), level, message)
            .with_location(SourceLocation::new(module, String::new(), caller.line()));
        record.process = Some(std::process::id());
        record.hostname = Some(self.hostname.clone());
        record
    }

    /// Send a prepared record as one frame
    pub async fn send(&self, record: &LogRecord) -> Result<()> {
        let mut conn_guard = self.connection.lock().await;
        if conn_guard.is_none() {
            if !self.config.auto_reconnect {
                return Err(RelayError::Connection("Connection is closed".to_string()));
            }
            *conn_guard = Some(self.open_connection().await?);
        }

        if let Some(conn) = conn_guard.as_mut() {
            if let Err(e) = conn.send(record).await {
                // Drop the broken connection so the next send reconnects.
                *conn_guard = None;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Log a message with the given level and extras
    #[track_caller]
    pub fn log<'a>(
        &'a self,
        level: LogLevel,
        message: &str,
        extra: Extras,
    ) -> impl Future<Output = Result<()>> + 'a {
        let mut record = self.record(level, message);
        record.extra = extra;
        async move { self.send(&record).await }
    }

    /// Log a message with an explicit source location, including function name
    pub fn log_at<'a>(
        &'a self,
        level: LogLevel,
        message: &str,
        location: SourceLocation,
        extra: Extras,
    ) -> impl Future<Output = Result<()>> + 'a {
        let mut record = self.record(level, message).with_location(location);
        record.extra = extra;
        async move { self.send(&record).await }
    }

    /// Log a debug message
    #[track_caller]
    pub fn debug<S: AsRef<str>>(&self, message: S) -> impl Future<Output = Result<()>> + '_ {
        self.log(LogLevel::Debug, message.as_ref(), Extras::new())
    }

    /// Log an info message
    #[track_caller]
    pub fn info<S: AsRef<str>>(&self, message: S) -> impl Future<Output = Result<()>> + '_ {
        self.log(LogLevel::Info, message.as_ref(), Extras::new())
    }

    /// Log an info message with extras
    #[track_caller]
    pub fn info_with_extra<S: AsRef<str>>(
        &self,
        message: S,
        extra: Extras,
    ) -> impl Future<Output = Result<()>> + '_ {
        self.log(LogLevel::Info, message.as_ref(), extra)
    }

    /// Log a warning message
    #[track_caller]
    pub fn warning<S: AsRef<str>>(&self, message: S) -> impl Future<Output = Result<()>> + '_ {
        self.log(LogLevel::Warning, message.as_ref(), Extras::new())
    }

    /// Log an error message
    #[track_caller]
    pub fn error<S: AsRef<str>>(&self, message: S) -> impl Future<Output = Result<()>> + '_ {
        self.log(LogLevel::Error, message.as_ref(), Extras::new())
    }

    /// Log an error message with extras
    #[track_caller]
    pub fn error_with_extra<S: AsRef<str>>(
        &self,
        message: S,
        extra: Extras,
    ) -> impl Future<Output = Result<()>> + '_ {
        self.log(LogLevel::Error, message.as_ref(), extra)
    }

    /// Log a critical message
    #[track_caller]
    pub fn critical<S: AsRef<str>>(&self, message: S) -> impl Future<Output = Result<()>> + '_ {
        self.log(LogLevel::Critical, message.as_ref(), Extras::new())
    }

    /// Log an error together with a captured stack trace
    #[track_caller]
    pub fn exception<S: AsRef<str>>(
        &self,
        message: S,
        trace: impl Into<String>,
        extra: Extras,
    ) -> impl Future<Output = Result<()>> + '_ {
        let mut record = self.record(LogLevel::Error, message.as_ref());
        record.extra = extra;
        record.exc_text = Some(trace.into());
        async move { self.send(&record).await }
    }

    /// Close the connection to the server
    pub async fn close(&self) -> Result<()> {
        let mut conn_guard = self.connection.lock().await;
        if let Some(conn) = conn_guard.take() {
            let mut stream = conn.into_inner();
            stream.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_payload;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn read_one_frame(stream: &mut TcpStream) -> LogRecord {
        let len = stream.read_u32().await.unwrap() as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        decode_payload(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = ClientConfig {
            server_addr: addr,
            logger_name: "myapp".to_string(),
            timeout_seconds: 1,
            ..Default::default()
        };
        match LogClient::with_config(config).await {
            Err(RelayError::Connection(_)) => {}
            _ => panic!("Expected Connection error"),
        }
    }

    #[tokio::test]
    async fn test_records_carry_metadata_and_caller_location() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let first = read_one_frame(&mut stream).await;
            let second = read_one_frame(&mut stream).await;
            (first, second)
        });

        let client = LogClient::connect(&addr, "myapp.area2").await.unwrap();
        let mut extra = Extras::new();
        extra.insert("a_num".to_string(), 42.into());
        let line = line!() + 1;
        client.error_with_extra("The five boxing wizards jump quickly.", extra).await.unwrap();
        client
            .exception("exception message", "ZeroDivisionError: division by zero", Extras::new())
            .await
            .unwrap();

        let (first, second) = server.await.unwrap();
        assert_eq!(first.name, "myapp.area2");
        assert_eq!(first.level, LogLevel::Error);
        assert_eq!(first.module, "logger");
        assert_eq!(first.lineno, line);
        assert_eq!(first.process, Some(std::process::id()));
        assert!(first.hostname.is_some());
        assert_eq!(first.extra.get("a_num"), Some(&42.into()));
        assert_eq!(second.exc_text.as_deref(), Some("ZeroDivisionError: division by zero"));
    }

    #[tokio::test]
    async fn test_log_at_carries_function_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_one_frame(&mut stream).await
        });

        let client = LogClient::connect(&addr, "myapp").await.unwrap();
        client
            .log_at(
                LogLevel::Info,
                "Jackdaws love my big sphinx of quartz.",
                SourceLocation::new("client", "sample_logs", 49),
                Extras::new(),
            )
            .await
            .unwrap();

        let record = server.await.unwrap();
        assert_eq!(record.func_name, "sample_logs");
        assert_eq!(record.module, "client");
        assert_eq!(record.lineno, 49);
        assert!(record.hostname.is_some());
    }

    #[tokio::test]
    async fn test_reconnects_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let mut received = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.unwrap();
                received.push(read_one_frame(&mut stream).await.msg);
            }
            received
        });

        let client = LogClient::connect(&addr, "myapp").await.unwrap();
        client.info("First message").await.unwrap();
        client.close().await.unwrap();
        assert!(client.connection.lock().await.is_none());

        client.info("Message after reconnect").await.unwrap();
        let received = server.await.unwrap();
        assert_eq!(received, vec!["First message", "Message after reconnect"]);
    }

    #[tokio::test]
    async fn test_no_reconnect_when_disabled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _server = tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let config = ClientConfig {
            server_addr: addr,
            logger_name: "myapp".to_string(),
            auto_reconnect: false,
            ..Default::default()
        };
        let client = LogClient::with_config(config).await.unwrap();
        client.close().await.unwrap();
        assert!(matches!(
            client.warning("dropped").await,
            Err(RelayError::Connection(_))
        ));
    }
}
