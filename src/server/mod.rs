//! LogRelay server implementation

pub mod connection;
pub mod listener;

use crate::config::ServerConfig;
use crate::sink::{
    ConsoleSink, DispatchSink, FileSinkRegistry, RecordSink, Route, TracingSink, ROOT_LOGGER,
};
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use connection::{ConnectionHandler, SessionEnd, SessionSummary};
pub use listener::{Listener, ListenerHandle};

/// How long [`LogServer::run_until`] waits for running sessions after a stop
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Main LogRelay server that wires configuration, sinks and the listener
pub struct LogServer {
    config: ServerConfig,
    sink: Arc<dyn RecordSink>,
    files: Arc<FileSinkRegistry>,
}

impl LogServer {
    /// Create a server whose sinks are built from `config`
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let files = Arc::new(FileSinkRegistry::new());
        let dispatch = DispatchSink::new();
        dispatch.set_override(config.routing.logname.clone());

        if config.file.enabled {
            let file = files.get_or_open(&config.file).await?;
            dispatch.route(ROOT_LOGGER, Route::new(file).with_min_level(config.file.level));
        }
        if config.console.enabled {
            let console = ConsoleSink::new(config.console.target, config.console.level);
            dispatch.route(ROOT_LOGGER, Route::new(Arc::new(console)));
        }
        if config.routing.tracing {
            dispatch.route(ROOT_LOGGER, Route::new(Arc::new(TracingSink::new())));
        }
        if dispatch.logger_count() == 0 {
            warn!("No sinks enabled, received records will be discarded");
        }

        Ok(Self {
            config,
            sink: Arc::new(dispatch),
            files,
        })
    }

    /// Create a server forwarding every record to `sink` instead of the configured sinks
    pub fn with_sink(config: ServerConfig, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            config,
            sink,
            files: Arc::new(FileSinkRegistry::new()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Sink every session forwards to
    pub fn sink(&self) -> Arc<dyn RecordSink> {
        Arc::clone(&self.sink)
    }

    /// File sinks opened from the configuration
    pub fn file_sinks(&self) -> &FileSinkRegistry {
        &self.files
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<Listener> {
        let handler = ConnectionHandler::new(self.sink(), self.config.server.max_frame_size);
        Listener::bind(
            &self.config.server.bind_addr(),
            handler,
            self.config.server.poll_interval(),
        )
        .await
    }

    /// Serve until Ctrl+C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C, stopping");
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Serve until `shutdown` completes, then stop accepting, let sessions
    /// drain for up to [`DRAIN_TIMEOUT`] and close the sinks
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        let handle = listener.handle();
        let accept_loop = tokio::spawn(listener.serve_until_stopped());

        shutdown.await;
        handle.stop();

        match accept_loop.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "Accept loop task failed"),
        }

        if tokio::time::timeout(DRAIN_TIMEOUT, handle.drained()).await.is_err() {
            warn!(
                active = handle.active_sessions(),
                "Sessions still running after drain timeout"
            );
        }

        self.shutdown().await
    }

    /// Flush and close every sink
    pub async fn shutdown(&self) -> Result<()> {
        self.sink.close().await?;
        self.files.close_all().await
    }
}
