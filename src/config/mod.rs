//! Configuration module for the classroom sync backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::ConsistencyPolicy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Remote hosting service settings
    pub remote: RemoteSettings,
    /// What to do with local rows whose remote counterpart cannot be verified
    pub consistency: ConsistencyPolicy,
}

/// Connection settings for the remote hosting service.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Base URL of the GitLab instance, without the `/api/v4` suffix
    pub base_url: String,
    /// Token used when a request does not carry its own
    pub default_token: Option<String>,
    /// Per-call timeout
    pub timeout: Duration,
    /// Attempts per call, including the first
    pub max_attempts: usize,
    /// Linear backoff step between attempts
    pub base_backoff_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("CLASSROOM_API_PSK").ok();

        let db_path = env::var("CLASSROOM_DB_PATH")
            .unwrap_or_else(|_| "./data/classroom.sqlite".to_string())
            .into();

        let index_path = env::var("CLASSROOM_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = env::var("CLASSROOM_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid CLASSROOM_BIND_ADDR format");

        let log_level = env::var("CLASSROOM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let remote = RemoteSettings {
            base_url: env::var("CLASSROOM_REMOTE_URL")
                .unwrap_or_else(|_| "https://gitlab.com".to_string()),
            default_token: env::var("CLASSROOM_REMOTE_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            timeout: Duration::from_secs(parse_var("CLASSROOM_REMOTE_TIMEOUT_SECS", 5)),
            max_attempts: parse_var("CLASSROOM_REMOTE_MAX_ATTEMPTS", 3),
            base_backoff_ms: parse_var("CLASSROOM_REMOTE_BACKOFF_MS", 200),
        };

        let consistency = env::var("CLASSROOM_CONSISTENCY")
            .ok()
            .map(|v| {
                v.parse::<ConsistencyPolicy>()
                    .expect("Invalid CLASSROOM_CONSISTENCY value")
            })
            .unwrap_or_default();

        Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            remote,
            consistency,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("Invalid {} value: {}", name, raw)),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        for var in [
            "CLASSROOM_API_PSK",
            "CLASSROOM_DB_PATH",
            "CLASSROOM_INDEX_PATH",
            "CLASSROOM_BIND_ADDR",
            "CLASSROOM_LOG_LEVEL",
            "CLASSROOM_REMOTE_URL",
            "CLASSROOM_REMOTE_TOKEN",
            "CLASSROOM_REMOTE_TIMEOUT_SECS",
            "CLASSROOM_REMOTE_MAX_ATTEMPTS",
            "CLASSROOM_REMOTE_BACKOFF_MS",
            "CLASSROOM_CONSISTENCY",
        ] {
            env::remove_var(var);
        }

        let config = Config::from_env();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/classroom.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.remote.base_url, "https://gitlab.com");
        assert!(config.remote.default_token.is_none());
        assert_eq!(config.remote.timeout, Duration::from_secs(5));
        assert_eq!(config.remote.max_attempts, 3);
        assert_eq!(config.consistency, ConsistencyPolicy::StrictRemoteConsistency);
    }
}
