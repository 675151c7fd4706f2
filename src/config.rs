//! Service configuration, loaded once from the environment at startup
//!
//! Configuration is immutable after load. Missing required values fail
//! fast with a diagnostic naming the variable, so a misconfigured
//! deployment dies at startup instead of at first use.

use crate::error::{HeraldError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which long-lived tasks the service hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceMode {
    /// Ingestion loop and HTTP API together (default)
    Combined,
    /// HTTP API only
    ApiOnly,
    /// Ingestion loop only
    PubsubOnly,
}

impl ServiceMode {
    pub fn runs_api(&self) -> bool {
        matches!(self, ServiceMode::Combined | ServiceMode::ApiOnly)
    }

    pub fn runs_ingest(&self) -> bool {
        matches!(self, ServiceMode::Combined | ServiceMode::PubsubOnly)
    }
}

impl FromStr for ServiceMode {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "combined" => Ok(ServiceMode::Combined),
            "api-only" => Ok(ServiceMode::ApiOnly),
            "pubsub-only" => Ok(ServiceMode::PubsubOnly),
            other => Err(HeraldError::Config(format!(
                "invalid service mode '{}': expected combined, api-only, or pubsub-only",
                other
            ))),
        }
    }
}

/// SMTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_ssl: bool,
    /// From address used when the envelope carries no sender
    pub default_sender: String,
}

/// NATS JetStream source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    /// JetStream stream holding inbound notification messages
    pub stream: String,
    /// Durable consumer name for this service
    pub consumer: String,
    /// Subject filter within the stream
    pub subject: String,
}

/// HTTP management API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl HttpConfig {
    /// Bind address string (e.g., "0.0.0.0:8080")
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: ServiceMode,
    pub smtp: SmtpConfig,
    /// Absent only in api-only mode
    pub nats: Option<NatsConfig>,
    pub http: HttpConfig,
    /// Grace period for in-flight messages on shutdown
    pub shutdown_grace_secs: u64,
}

fn require(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| HeraldError::Config(format!("required environment variable {} is not set", key)))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u16(key: &str, raw: &str) -> Result<u16> {
    raw.parse()
        .map_err(|_| HeraldError::Config(format!("{} must be a port number, got '{}'", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(HeraldError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

impl Config {
    /// Load configuration from `HERALD_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mode: ServiceMode = optional("HERALD_SERVICE_MODE", "combined").parse()?;

        let smtp = SmtpConfig {
            host: require("HERALD_SMTP_HOST")?,
            port: parse_u16("HERALD_SMTP_PORT", &optional("HERALD_SMTP_PORT", "587"))?,
            username: optional("HERALD_SMTP_USER", ""),
            password: optional("HERALD_SMTP_PASSWORD", ""),
            use_ssl: parse_bool("HERALD_SMTP_USE_SSL", &optional("HERALD_SMTP_USE_SSL", "true"))?,
            default_sender: require("HERALD_DEFAULT_SENDER")?,
        };

        let nats = if mode.runs_ingest() {
            Some(NatsConfig {
                url: require("HERALD_NATS_URL")?,
                stream: optional("HERALD_STREAM", "NOTIFICATIONS"),
                consumer: optional("HERALD_CONSUMER", "herald"),
                subject: optional("HERALD_SUBJECT", "notifications.>"),
            })
        } else {
            None
        };

        let http = HttpConfig {
            host: optional("HERALD_HTTP_HOST", "0.0.0.0"),
            port: parse_u16("HERALD_HTTP_PORT", &optional("HERALD_HTTP_PORT", "8080"))?,
        };

        let shutdown_grace_secs = optional("HERALD_SHUTDOWN_GRACE_SECS", "30")
            .parse()
            .map_err(|_| {
                HeraldError::Config("HERALD_SHUTDOWN_GRACE_SECS must be an integer".to_string())
            })?;

        Ok(Self {
            mode,
            smtp,
            nats,
            http,
            shutdown_grace_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_mode_parse() {
        assert_eq!("combined".parse::<ServiceMode>().unwrap(), ServiceMode::Combined);
        assert_eq!("api-only".parse::<ServiceMode>().unwrap(), ServiceMode::ApiOnly);
        assert_eq!("pubsub-only".parse::<ServiceMode>().unwrap(), ServiceMode::PubsubOnly);
        assert!("both".parse::<ServiceMode>().is_err());
    }

    #[test]
    fn test_service_mode_tasks() {
        assert!(ServiceMode::Combined.runs_api());
        assert!(ServiceMode::Combined.runs_ingest());
        assert!(ServiceMode::ApiOnly.runs_api());
        assert!(!ServiceMode::ApiOnly.runs_ingest());
        assert!(!ServiceMode::PubsubOnly.runs_api());
        assert!(ServiceMode::PubsubOnly.runs_ingest());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("K", "true").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "no").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn test_parse_u16() {
        assert_eq!(parse_u16("K", "8080").unwrap(), 8080);
        assert!(parse_u16("K", "eighty").is_err());
        assert!(parse_u16("K", "70000").is_err());
    }

    #[test]
    fn test_bind_address() {
        let http = HttpConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
        };
        assert_eq!(http.bind_address(), "127.0.0.1:9000");
    }
}
