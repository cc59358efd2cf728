//! In-memory record collector

use super::RecordSink;
use crate::types::LogRecord;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Keeps every accepted record in arrival order
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
    notify: Notify,
}

impl MemorySink {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Number of records received so far
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been received yet
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Wait until at least `count` records arrived or `limit` elapsed.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> bool {
        tokio::time::timeout(limit, async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn accept(&self, record: &LogRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}
