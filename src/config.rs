//! Configuration management for the limiter service.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{LimiterError, Result};
use crate::ratelimit::{LimiterSettings, MAX_DURATION_SECS};

/// Prefix for environment variable overrides, e.g. `EWP_SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "EWP";

/// Main configuration for the limiter service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named limiters registered at startup
    #[serde(default = "default_limiters")]
    pub limiters: Vec<LimiterSettings>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            limiters: default_limiters(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Bearer token for the admin endpoints; they are not served when unset
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            admin_token: None,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The limiters eatwhilepregnant.com runs with.
pub fn default_limiters() -> Vec<LimiterSettings> {
    vec![
        LimiterSettings::new("search", 100, 600).with_max_entries(10_000),
        LimiterSettings::new("feedback", 5, 3600),
        LimiterSettings::new("suggest", 500, 60),
        LimiterSettings::new("all-documents", 5, 10),
    ]
}

impl ServiceConfig {
    /// Load configuration from an optional file, overridden by `EWP_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }

        let config: ServiceConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ServiceConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the limiter definitions.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for limiter in &self.limiters {
            if limiter.name.trim().is_empty() {
                return Err(LimiterError::Config("limiter name must not be empty".into()));
            }
            if limiter.points == 0 {
                return Err(LimiterError::Config(format!(
                    "limiter {:?} must allow at least one point",
                    limiter.name
                )));
            }
            if limiter.duration_secs == 0 {
                return Err(LimiterError::Config(format!(
                    "limiter {:?} must have a non-zero duration",
                    limiter.name
                )));
            }
            if limiter.duration_secs > MAX_DURATION_SECS {
                return Err(LimiterError::Config(format!(
                    "limiter {:?} duration must not exceed {} seconds",
                    limiter.name, MAX_DURATION_SECS
                )));
            }
            if !seen.insert(limiter.name.as_str()) {
                return Err(LimiterError::Config(format!(
                    "limiter {:?} is defined more than once",
                    limiter.name
                )));
            }
        }

        if let Some(token) = &self.server.admin_token {
            if token.trim().is_empty() {
                return Err(LimiterError::Config("admin_token must not be blank".into()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();

        assert_eq!(config.server.http_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(config.server.admin_token.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.limiters.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  http_addr: 0.0.0.0:9000
  admin_token: s3cret
logging:
  level: debug
  format: json
limiters:
  - name: search
    points: 100
    duration_secs: 600
    max_entries: 10000
  - name: feedback
    points: 5
    duration_secs: 3600
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.server.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.limiters.len(), 2);
        assert_eq!(config.limiters[0].max_entries, 10_000);
        assert_eq!(config.limiters[1].max_entries, 5000);
    }

    #[test]
    fn test_missing_limiters_use_defaults() {
        let config = ServiceConfig::from_yaml("server:\n  http_addr: 127.0.0.1:3000\n").unwrap();

        let names: Vec<&str> = config.limiters.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["search", "feedback", "suggest", "all-documents"]);
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = r#"
limiters:
  - name: search
    points: 1
    duration_secs: 1
  - name: search
    points: 2
    duration_secs: 2
"#;
        let err = ServiceConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_zero_points_and_duration() {
        let zero_points = "limiters:\n  - name: a\n    points: 0\n    duration_secs: 1\n";
        assert!(ServiceConfig::from_yaml(zero_points).is_err());

        let zero_duration = "limiters:\n  - name: a\n    points: 1\n    duration_secs: 0\n";
        assert!(ServiceConfig::from_yaml(zero_duration).is_err());
    }

    #[test]
    fn test_rejects_oversized_duration() {
        let yaml = format!(
            "limiters:\n  - name: a\n    points: 1\n    duration_secs: {}\n",
            u64::MAX
        );
        let err = ServiceConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));

        let yaml = format!(
            "limiters:\n  - name: a\n    points: 1\n    duration_secs: {}\n",
            MAX_DURATION_SECS
        );
        assert!(ServiceConfig::from_yaml(&yaml).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("EWP_SERVER__HTTP_ADDR", "127.0.0.1:9999");
        std::env::set_var("EWP_LOGGING__LEVEL", "trace");

        let config = ServiceConfig::load(None);

        std::env::remove_var("EWP_SERVER__HTTP_ADDR");
        std::env::remove_var("EWP_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.limiters.len(), 4);
    }

    #[test]
    fn test_rejects_invalid_yaml() {
        let err = ServiceConfig::from_yaml("limiters: [not, a, limiter").unwrap_err();
        assert!(matches!(err, LimiterError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ewp-limiter-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "limiters:\n  - name: suggest\n    points: 500\n    duration_secs: 60\n",
        )
        .unwrap();

        let config = ServiceConfig::load(Some(path.as_path())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiters.len(), 1);
        assert_eq!(config.limiters[0].name, "suggest");
        assert_eq!(config.limiters[0].max_entries, 5000);
    }
}
