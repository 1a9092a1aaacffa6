//! TOML configuration for the monitor

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use callstatus_ami::{AmiConfig, DEFAULT_AMI_PORT};
use callstatus_core::EngineConfig;

use crate::output::OutputFormat;
use crate::supervisor::SupervisorConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AsteriskConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub secret: String,
    /// AstDB family holding caller names
    #[serde(default)]
    pub db_family: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub lookup_retry_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { lookup_retry_secs: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSection {
    pub reconnect_interval_secs: u64,
    pub status_refresh_secs: u64,
    pub connect_timeout_secs: u64,
    pub ready_timeout_secs: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            reconnect_interval_secs: 1,
            status_refresh_secs: 60,
            connect_timeout_secs: 10,
            ready_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub format: OutputFormat,
}

/// Whole configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub asterisk: AsteriskConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub output: OutputSection,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_AMI_PORT
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.asterisk.host.trim().is_empty() {
            return Err(ConfigError::Invalid("asterisk.host must not be empty".to_string()));
        }
        if self.asterisk.port == 0 {
            return Err(ConfigError::Invalid("asterisk.port must not be 0".to_string()));
        }
        if self.asterisk.username.trim().is_empty() {
            return Err(ConfigError::Invalid("asterisk.username must not be empty".to_string()));
        }

        let intervals = [
            ("engine.lookup_retry_secs", self.engine.lookup_retry_secs),
            ("supervisor.reconnect_interval_secs", self.supervisor.reconnect_interval_secs),
            ("supervisor.status_refresh_secs", self.supervisor.status_refresh_secs),
            ("supervisor.connect_timeout_secs", self.supervisor.connect_timeout_secs),
            ("supervisor.ready_timeout_secs", self.supervisor.ready_timeout_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
        }

        Ok(())
    }

    pub fn ami_config(&self) -> AmiConfig {
        let timeout = Duration::from_secs(self.supervisor.connect_timeout_secs);
        AmiConfig::new(&self.asterisk.host, &self.asterisk.username, &self.asterisk.secret)
            .with_port(self.asterisk.port)
            .with_connect_timeout(timeout)
            .with_response_timeout(timeout)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .with_lookup_retry(Duration::from_secs(self.engine.lookup_retry_secs));
        if let Some(family) = self.asterisk.db_family.as_deref().filter(|f| !f.is_empty()) {
            config = config.with_lookup_family(family);
        }
        config
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            ami: self.ami_config(),
            reconnect_interval: Duration::from_secs(self.supervisor.reconnect_interval_secs),
            status_refresh_interval: Duration::from_secs(self.supervisor.status_refresh_secs),
            ready_timeout: Duration::from_secs(self.supervisor.ready_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [asterisk]
        username = "monitor"
        secret = "s3cret"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.asterisk.host, "127.0.0.1");
        assert_eq!(config.asterisk.port, 5038);
        assert_eq!(config.asterisk.db_family, None);
        assert_eq!(config.engine, EngineSection::default());
        assert_eq!(config.supervisor.status_refresh_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.engine_config().lookup_family, None);
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_toml(
            r#"
            [asterisk]
            host = "pbx.example.net"
            port = 5039
            username = "monitor"
            secret = "s3cret"
            db_family = "cidname"

            [engine]
            lookup_retry_secs = 2

            [supervisor]
            reconnect_interval_secs = 3
            status_refresh_secs = 30
            connect_timeout_secs = 4
            ready_timeout_secs = 8

            [logging]
            level = "debug"
            json = true

            [output]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.ami_config().address(), "pbx.example.net:5039");
        assert_eq!(config.engine_config().lookup_family.as_deref(), Some("cidname"));
        assert_eq!(config.engine_config().lookup_retry, Duration::from_secs(2));

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.reconnect_interval, Duration::from_secs(3));
        assert_eq!(supervisor.status_refresh_interval, Duration::from_secs(30));
        assert_eq!(supervisor.ready_timeout, Duration::from_secs(8));
        assert_eq!(supervisor.ami.connect_timeout, Duration::from_secs(4));
        assert!(config.logging.json);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_empty_family_disables_lookups() {
        let config = AppConfig::from_toml(&format!("{}\ndb_family = \"\"", MINIMAL)).unwrap();
        assert_eq!(config.engine_config().lookup_family, None);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = AppConfig::from_toml("[asterisk]\nhost = \"pbx\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = AppConfig::from_toml(&format!("{}\n[supervisor]\nstatus_refresh_secs = 0", MINIMAL))
            .unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("status_refresh_secs")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_username_rejected() {
        let err = AppConfig::from_toml("[asterisk]\nusername = \" \"\nsecret = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = AppConfig::from_toml(&format!("{}\npasword = \"typo\"", MINIMAL)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.asterisk.username, "monitor");

        let err = AppConfig::load("/nonexistent/call-status.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
