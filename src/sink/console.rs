//! Human-readable mirror of records on stdout or stderr

use super::RecordSink;
use crate::types::{LogLevel, LogRecord};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Console stream to write to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleTarget {
    /// Standard output
    Stdout,
    /// Standard error
    #[default]
    Stderr,
}

/// Writes one human-readable line per record
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    target: ConsoleTarget,
    min_level: LogLevel,
}

impl ConsoleSink {
    /// Create a console sink
    pub fn new(target: ConsoleTarget, min_level: LogLevel) -> Self {
        Self { target, min_level }
    }

    // Returns whether the record passed the level filter.
    fn write_record<W: Write>(&self, out: &mut W, record: &LogRecord) -> Result<bool> {
        if record.level < self.min_level {
            return Ok(false);
        }
        writeln!(out, "{}", record.to_human_readable())?;
        Ok(true)
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(ConsoleTarget::Stderr, LogLevel::Debug)
    }
}

#[async_trait]
impl RecordSink for ConsoleSink {
    async fn accept(&self, record: &LogRecord) -> Result<()> {
        // One locked write per record keeps lines from different sessions whole.
        match self.target {
            ConsoleTarget::Stdout => self.write_record(&mut std::io::stdout().lock(), record)?,
            ConsoleTarget::Stderr => self.write_record(&mut std::io::stderr().lock(), record)?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_drops_records() {
        let sink = ConsoleSink::new(ConsoleTarget::Stdout, LogLevel::Warning);
        let mut out = Vec::new();

        let quiet = LogRecord::new("myapp.area1", LogLevel::Info, "How quickly daft jumping zebras vex.");
        let loud = LogRecord::new("myapp.area2", LogLevel::Critical, "A failure occurred.");
        assert!(!sink.write_record(&mut out, &quiet).unwrap());
        assert!(sink.write_record(&mut out, &loud).unwrap());

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("A failure occurred."));
        assert!(!text.contains("zebras"));
    }

    #[test]
    fn test_target_parses_lowercase() {
        let target: ConsoleTarget = serde_json::from_str("\"stdout\"").unwrap();
        assert_eq!(target, ConsoleTarget::Stdout);
        assert_eq!(ConsoleTarget::default(), ConsoleTarget::Stderr);
    }
}
