//! Log record types and utilities

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Extra attributes attached to a record by the producer at the call site
pub type Extras = BTreeMap<String, ExtraValue>;

/// Log severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug: diagnostic detail
    Debug,
    /// Info: confirmation that things work as expected
    Info,
    /// Warning: something unexpected, still working
    Warning,
    /// Error: an operation failed
    Error,
    /// Critical: the program may be unable to continue
    Critical,
}

impl LogLevel {
    /// Numeric severity, compatible with the conventional 10..50 scale
    pub fn severity(self) -> u8 {
        match self {
            LogLevel::Debug => 10,
            LogLevel::Info => 20,
            LogLevel::Warning => 30,
            LogLevel::Error => 40,
            LogLevel::Critical => 50,
        }
    }

    /// Canonical upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// A typed scalar value carried in the extras mapping.
///
/// Only scalars are representable; nested arrays or objects in a payload are
/// rejected at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    Str(String),
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraValue::Null => write!(f, "null"),
            ExtraValue::Bool(b) => write!(f, "{}", b),
            ExtraValue::Int(i) => write!(f, "{}", i),
            ExtraValue::Float(x) => write!(f, "{}", x),
            ExtraValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ExtraValue {
    fn from(v: bool) -> Self {
        ExtraValue::Bool(v)
    }
}

impl From<i64> for ExtraValue {
    fn from(v: i64) -> Self {
        ExtraValue::Int(v)
    }
}

impl From<i32> for ExtraValue {
    fn from(v: i32) -> Self {
        ExtraValue::Int(i64::from(v))
    }
}

impl From<f64> for ExtraValue {
    fn from(v: f64) -> Self {
        ExtraValue::Float(v)
    }
}

impl From<&str> for ExtraValue {
    fn from(v: &str) -> Self {
        ExtraValue::Str(v.to_string())
    }
}

impl From<String> for ExtraValue {
    fn from(v: String) -> Self {
        ExtraValue::Str(v)
    }
}

/// Where in the producer's code the record was emitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Module (or file stem) of the call site
    pub module: String,
    /// Function name of the call site
    pub function: String,
    /// Line number of the call site
    pub line: u32,
}

impl SourceLocation {
    /// Create a source location
    pub fn new(module: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            line,
        }
    }
}

/// A structured log record as it travels over the wire.
///
/// The serde layout is the wire schema: a fixed field list, unknown fields
/// rejected, extras limited to [`ExtraValue`] scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogRecord {
    /// Name of the logger that produced the record
    pub name: String,

    /// Severity
    pub level: LogLevel,

    /// Fully formatted message
    pub msg: String,

    /// When the record was created
    pub created: DateTime<Utc>,

    /// Module of the call site
    pub module: String,

    /// Function of the call site
    pub func_name: String,

    /// Line of the call site
    pub lineno: u32,

    /// Identifier of the producing thread
    pub thread: String,

    /// Process id of the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<u32>,

    /// Hostname of the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Captured stack trace for exception records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exc_text: Option<String>,

    /// Free-form attributes supplied at the call site
    #[serde(default)]
    pub extra: Extras,
}

impl LogRecord {
    /// Create a record stamped with the current time and thread
    pub fn new(name: impl Into<String>, level: LogLevel, msg: impl Into<String>) -> Self {
        let thread = std::thread::current();
        let thread = match thread.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", thread.id()),
        };

        Self {
            name: name.into(),
            level,
            msg: msg.into(),
            created: Utc::now(),
            module: String::new(),
            func_name: String::new(),
            lineno: 0,
            thread,
            process: None,
            hostname: None,
            exc_text: None,
            extra: Extras::new(),
        }
    }

    /// Set the call-site location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.module = location.module;
        self.func_name = location.function;
        self.lineno = location.line;
        self
    }

    /// Attach one extra attribute
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<ExtraValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Attach a captured stack trace
    pub fn with_exc_text(mut self, trace: impl Into<String>) -> Self {
        self.exc_text = Some(trace.into());
        self
    }

    /// Call-site location as a single value
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.module.clone(), self.func_name.clone(), self.lineno)
    }

    /// Serialize to a single-line JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Format as human-readable string
    pub fn to_human_readable(&self) -> String {
        let timestamp = self.created.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut line = format!(
            "{} {:<8} {} [{}:{}] {}",
            timestamp, self.level, self.name, self.module, self.lineno, self.msg
        );
        for (key, value) in &self.extra {
            line.push_str(&format!(" {}={}", key, value));
        }
        if let Some(trace) = &self.exc_text {
            line.push('\n');
            line.push_str(trace);
        }
        line
    }
}
