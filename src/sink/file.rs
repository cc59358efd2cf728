//! File sink backed by a rotating, compressing writer

use super::rotation::{RotatingFileWriter, RotationState, WriterState};
use super::RecordSink;
use crate::config::FileSinkSettings;
use crate::types::LogRecord;
use crate::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// How a record is rendered into a file line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Human,
}

impl LineFormat {
    /// Render a record without trailing newline
    pub fn render(self, record: &LogRecord) -> Result<String> {
        match self {
            LineFormat::Json => Ok(record.to_json()?),
            LineFormat::Human => Ok(record.to_human_readable()),
        }
    }
}

/// Appends records to one rotating file.
///
/// All appenders go through the internal mutex, so a single `FileSink` is the
/// only writer of its path.
pub struct FileSink {
    path: PathBuf,
    format: LineFormat,
    writer: Mutex<RotatingFileWriter>,
}

impl FileSink {
    /// Open the sink's file according to `settings`
    pub async fn open(settings: &FileSinkSettings) -> Result<Self> {
        let writer =
            RotatingFileWriter::open(&settings.path, settings.max_bytes, &settings.extension).await?;
        Ok(Self {
            path: settings.path.clone(),
            format: settings.format,
            writer: Mutex::new(writer),
        })
    }

    /// Active file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the writer's rotation bookkeeping
    pub async fn rotation_state(&self) -> RotationState {
        self.writer.lock().await.state().clone()
    }

    /// Current writer lifecycle state
    pub async fn status(&self) -> WriterState {
        self.writer.lock().await.status().clone()
    }

    /// Retry an interrupted rotation; see [`RotatingFileWriter::recover`]
    pub async fn recover(&self) -> Result<Option<PathBuf>> {
        self.writer.lock().await.recover().await
    }
}

#[async_trait]
impl RecordSink for FileSink {
    async fn accept(&self, record: &LogRecord) -> Result<()> {
        let line = self.format.render(record)?;
        let mut writer = self.writer.lock().await;
        writer.append(&line).await
    }

    async fn close(&self) -> Result<()> {
        self.writer.lock().await.close().await
    }
}

/// Hands out one shared [`FileSink`] per file path
#[derive(Default)]
pub struct FileSinkRegistry {
    sinks: DashMap<PathBuf, Arc<FileSink>>,
}

impl FileSinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the sink for `settings.path`, opening it on first use
    pub async fn get_or_open(&self, settings: &FileSinkSettings) -> Result<Arc<FileSink>> {
        if let Some(existing) = self.sinks.get(&settings.path) {
            return Ok(Arc::clone(&*existing));
        }

        let opened = Arc::new(FileSink::open(settings).await?);
        // A concurrent caller may have won the race; its sink is kept and ours
        // is dropped before writing anything.
        let sink = match self.sinks.entry(settings.path.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => Arc::clone(entry.insert(opened).value()),
        };
        Ok(sink)
    }

    /// Sink already registered for `path`
    pub fn get(&self, path: &Path) -> Option<Arc<FileSink>> {
        self.sinks.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of open sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink has been opened
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Close every registered sink, reporting the first failure
    pub async fn close_all(&self) -> Result<()> {
        let sinks: Vec<Arc<FileSink>> = self.sinks.iter().map(|e| Arc::clone(e.value())).collect();
        let mut first_error = None;
        for sink in sinks {
            if let Err(e) = sink.close().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
