// 🔧 Process Configuration - environment for the CLI and server binaries
//
// Scoring coefficients live in `ScoringPolicy`; this is only where the process runs,
// how loudly it logs, and which policy file it loads.

use crate::policy::ScoringPolicy;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    /// JSON policy file; None means the built-in defaults
    pub policy_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::parse(
            &env::var("CREDIBILITY_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("CREDIBILITY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("CREDIBILITY_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("CREDIBILITY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let policy_path = env::var("CREDIBILITY_POLICY")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            policy_path,
        })
    }

    /// The configured policy file, or the defaults when none is set
    pub fn scoring_policy(&self) -> anyhow::Result<ScoringPolicy> {
        match &self.policy_path {
            Some(path) => ScoringPolicy::from_file(path),
            None => Ok(ScoringPolicy::default()),
        }
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CREDIBILITY_PORT must be a valid u16")]
    InvalidPort,
    #[error("CREDIBILITY_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
}

// ============================================================================
// TESTS
// ============================================================================
