//! Core data types shared by the codec, server and sinks

pub mod record;

pub use record::{ExtraValue, Extras, LogLevel, LogRecord, SourceLocation};
