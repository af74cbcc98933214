//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `JWT_SECRET` - HS256 secret shared with the identity provider (min 16 chars)
//!
//! ## Optional
//! - `DATABASE_URL` - `PostgreSQL` connection string; the in-memory store is used when unset
//! - `DATABASE_MAX_CONNECTIONS` - pool size (default: 10)
//! - `HOST` - bind address (default: 0.0.0.0)
//! - `PORT` - listen port (default: 8083)
//! - `NATS_URL` - publish domain events to NATS when set
//! - `LOG_FORMAT` - `text` or `json` (default: text)
//! - `ORDER_STATUS_POLICY` - `permissive` or `sequential` (default: permissive)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

use crate::domain::aggregates::StatusPolicy;

const MIN_JWT_SECRET_LENGTH: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat { #[default] Text, Json }

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub nats_url: Option<String>,
    pub log_format: LogFormat,
    pub status_policy: StatusPolicy,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("database_max_connections", &self.database_max_connections)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("nats_url", &self.nats_url.as_ref().map(|_| "[redacted]"))
            .field("log_format", &self.log_format)
            .field("status_policy", &self.status_policy)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".into()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::InvalidEnvVar(
                "JWT_SECRET".into(),
                format!("must be at least {MIN_JWT_SECRET_LENGTH} characters"),
            ));
        }

        let host = match get("HOST") {
            Some(raw) => raw.parse::<IpAddr>().map_err(|e| ConfigError::InvalidEnvVar("HOST".into(), e.to_string()))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidEnvVar("PORT".into(), e.to_string()))?,
            None => 8083,
        };
        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidEnvVar("DATABASE_MAX_CONNECTIONS".into(), format!("'{raw}' is not a positive integer")))?,
            None => 10,
        };
        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidEnvVar("LOG_FORMAT".into(), format!("unknown format '{other}'"))),
        };
        let status_policy = match get("ORDER_STATUS_POLICY").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("permissive") => StatusPolicy::Permissive,
            Some("sequential") => StatusPolicy::Sequential,
            Some(other) => return Err(ConfigError::InvalidEnvVar("ORDER_STATUS_POLICY".into(), format!("unknown policy '{other}'"))),
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            database_max_connections,
            host,
            port,
            jwt_secret,
            nats_url: get("NATS_URL"),
            log_format,
            status_policy,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}
