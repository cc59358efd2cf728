//! # LogRelay - Length-Prefixed Log Record Receiver
//!
//! LogRelay accepts structured log records streamed over persistent TCP
//! connections by many concurrent producers and re-emits them through a locally
//! configured pipeline, including a size-rotated, gzip-compressed file sink.
//!
//! ## Features
//!
//! - **Framed Wire Protocol**: 4-byte big-endian length prefix + fixed-schema JSON payload
//! - **Concurrent Sessions**: one task per connection, cooperative shutdown
//! - **Log Rotation**: size-based rotation with timestamped names and gzip compression
//! - **Routing**: hierarchical logger-name routing to console, file or `tracing`
//!
//! ## Quick Start
//!
//! ### Server
//! ```no_run
//! use logrelay::config::ServerConfig;
//! use logrelay::server::LogServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_file("config/server.toml")?;
//!     let server = LogServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Client
//! ```no_run
//! use logrelay::client::LogClient;
//! use logrelay::types::Extras;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LogClient::connect("127.0.0.1:9020", "myapp").await?;
//!
//!     let mut extra = Extras::new();
//!     extra.insert("a_num".to_string(), 42.into());
//!
//!     client.error_with_extra("The five boxing wizards jump quickly.", extra).await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod codec;
pub mod config;
pub mod server;
pub mod sink;
pub mod types;

/// Common error types used throughout LogRelay
pub mod error {
    use std::path::PathBuf;
    use thiserror::Error;

    /// LogRelay error types
    #[derive(Debug, Error)]
    pub enum RelayError {
        /// I/O operation failed
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        /// JSON serialization failed
        #[error("Serialization error: {0}")]
        Json(#[from] serde_json::Error),

        /// Configuration could not be loaded or is invalid
        #[error("Configuration error: {0}")]
        Config(String),

        /// The listener could not bind its address
        #[error("Failed to bind {addr}: {source}")]
        BindFailure {
            /// Address that was requested
            addr: String,
            /// Underlying socket error
            source: std::io::Error,
        },

        /// Frame length prefix and payload disagree, or the length is out of bounds
        #[error("Malformed frame: {0}")]
        MalformedFrame(String),

        /// Payload could not be parsed into a log record
        #[error("Unsupported payload: {0}")]
        UnsupportedPayload(String),

        /// Peer closed the connection in the middle of a frame
        #[error("Connection closed with {pending} bytes of an incomplete frame")]
        ConnectionClosedEarly {
            /// Bytes received for the unfinished frame
            pending: usize,
        },

        /// Rotating the active log file failed
        #[error("Rotation of {path} failed: {source}")]
        RotationFailure {
            /// Active file being rotated
            path: PathBuf,
            /// Underlying I/O error
            source: std::io::Error,
        },

        /// Sink refuses writes after an earlier failure or after close
        #[error("Sink {path} is not accepting writes: {reason}")]
        SinkFailed {
            /// Active file of the sink
            path: PathBuf,
            /// Why the sink is unavailable
            reason: String,
        },

        /// Client connection error
        #[error("Connection error: {0}")]
        Connection(String),
    }

    impl RelayError {
        /// Whether this error is a decode-time fault of the peer's stream
        pub fn is_decode_fault(&self) -> bool {
            matches!(
                self,
                RelayError::MalformedFrame(_) | RelayError::UnsupportedPayload(_)
            )
        }
    }

    /// Result type alias for LogRelay operations
    pub type Result<T> = std::result::Result<T, RelayError>;
}

pub use error::{RelayError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::LogClient;
    pub use crate::config::ServerConfig;
    pub use crate::server::{ListenerHandle, LogServer};
    pub use crate::sink::{FileSink, RecordSink};
    pub use crate::types::{ExtraValue, Extras, LogLevel, LogRecord};
    pub use crate::{RelayError, Result};
}
