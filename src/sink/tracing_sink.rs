//! Re-emits received records as `tracing` events

use super::RecordSink;
use crate::types::{LogLevel, LogRecord};
use crate::Result;
use async_trait::async_trait;

/// Target used for every re-emitted event
pub const RECORD_TARGET: &str = "logrelay::record";

/// Default `EnvFilter` directives for the server binary.
///
/// Re-emitted records pass at every level, so enabling the tracing route never
/// drops DEBUG records that the file sink would keep.
pub fn default_directives(verbose: bool) -> String {
    let base = if verbose { "logrelay=debug,info" } else { "logrelay=info,warn" };
    format!("{},{}=debug", base, RECORD_TARGET)
}

/// Feeds records into the process's `tracing` subscriber.
///
/// The producer's logger name, call site and extras travel as event fields;
/// `tracing` levels have no CRITICAL, so it maps to ERROR with `critical = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a tracing sink
    pub fn new() -> Self {
        Self
    }
}

fn extras_field(record: &LogRecord) -> String {
    record
        .extra
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

macro_rules! emit {
    ($level:expr, $record:expr, $extra:expr, $critical:expr) => {
        tracing::event!(
            target: RECORD_TARGET,
            $level,
            logger = %$record.name,
            module = %$record.module,
            func = %$record.func_name,
            line = $record.lineno,
            thread = %$record.thread,
            created = %$record.created,
            extra = %$extra,
            exc_text = $record.exc_text.as_deref(),
            critical = $critical,
            "{}",
            $record.msg
        )
    };
}

#[async_trait]
impl RecordSink for TracingSink {
    async fn accept(&self, record: &LogRecord) -> Result<()> {
        let extra = extras_field(record);
        match record.level {
            LogLevel::Debug => emit!(tracing::Level::DEBUG, record, extra, false),
            LogLevel::Info => emit!(tracing::Level::INFO, record, extra, false),
            LogLevel::Warning => emit!(tracing::Level::WARN, record, extra, false),
            LogLevel::Error => emit!(tracing::Level::ERROR, record, extra, false),
            LogLevel::Critical => emit!(tracing::Level::ERROR, record, extra, true),
        }
        Ok(())
    }
}
