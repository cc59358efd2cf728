//! Destinations for decoded log records

pub mod console;
pub mod dispatch;
pub mod file;
pub mod memory;
pub mod rotation;
pub mod tracing_sink;

use crate::types::LogRecord;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use console::{ConsoleSink, ConsoleTarget};
pub use dispatch::{DispatchSink, Route, ROOT_LOGGER};
pub use file::{FileSink, FileSinkRegistry, LineFormat};
pub use memory::MemorySink;
pub use rotation::{
    compress_file, RotatingFileWriter, RotationState, WriterState, DEFAULT_EXTENSION,
    ROTATION_TIMESTAMP_FORMAT,
};
pub use tracing_sink::{default_directives, TracingSink, RECORD_TARGET};

/// Anything that can take ownership of a decoded record for further handling
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Hand one record to the sink
    async fn accept(&self, record: &LogRecord) -> Result<()>;

    /// Flush and release resources; called once on server shutdown
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Delivers each record to several sinks in order.
///
/// Every sink sees every record even when an earlier one fails; the first
/// failure is reported to the caller.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    pub fn with(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are attached
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl RecordSink for FanoutSink {
    async fn accept(&self, record: &LogRecord) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.accept(record).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn close(&self) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
