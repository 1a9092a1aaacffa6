//! Library side of the `asterisk-call-status` monitor.

pub mod config;
pub mod logging;
pub mod output;
pub mod supervisor;

pub use config::{AppConfig, ConfigError};
pub use logging::{setup_logging, LoggingConfig};
pub use output::{render, spawn_output_task, OutputFormat};
pub use supervisor::{SharedTransport, Supervisor, SupervisorConfig};
