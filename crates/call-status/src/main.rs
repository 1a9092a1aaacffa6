use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use callstatus_cli::logging::{log_welcome, parse_log_level};
use callstatus_cli::{setup_logging, spawn_output_task, AppConfig, LoggingConfig, OutputFormat, Supervisor};
use callstatus_core::ChannelPublisher;

/// Print live call status from an Asterisk PBX
#[derive(Parser, Debug)]
#[command(name = "asterisk-call-status", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CALL_STATUS_CONFIG")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, env = "CALL_STATUS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Override the configured output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }

    let mut logging = LoggingConfig::new(parse_log_level(&config.logging.level)?);
    if config.logging.json {
        logging = logging.with_json();
    }
    setup_logging(logging)?;
    log_welcome(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let (publisher, snapshots) = ChannelPublisher::new();
    let output = spawn_output_task(snapshots, config.output.format);

    let supervisor = Supervisor::new(
        config.supervisor_config(),
        config.engine_config(),
        Arc::new(publisher),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // Dropping the engine drops the publisher, which ends the output task.
    drop(supervisor.run(shutdown).await);
    output.await.context("output task failed")?;

    Ok(())
}
