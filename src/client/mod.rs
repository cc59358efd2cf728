//! LogRelay producer client

pub mod logger;

pub use crate::types::LogLevel;
pub use logger::LogClient;
