//! Configuration management for LogRelay

pub mod settings;

pub use settings::{
    ClientConfig, ConsoleSettings, FileSinkSettings, RoutingSettings, ServerConfig,
    ServerSettings, ENV_PREFIX,
};
