//! Server configuration from the environment

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_HYPOTHESIS_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RUNTIME_IDLE_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub port: u16,
    /// Upper bound on one hypothesis generation
    pub hypothesis_timeout: Duration,
    /// A user's runtime stops after this long without messages
    pub runtime_idle_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("TRIAGE_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".triage-assistant/triage.db")
            },
            PathBuf::from,
        );

        let port = lookup("TRIAGE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let secs = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .filter(|&s: &u64| s > 0)
                .map_or(Duration::from_secs(default), Duration::from_secs)
        };

        Self {
            db_path,
            port,
            hypothesis_timeout: secs(
                "TRIAGE_HYPOTHESIS_TIMEOUT_SECS",
                DEFAULT_HYPOTHESIS_TIMEOUT_SECS,
            ),
            runtime_idle_timeout: secs("TRIAGE_RUNTIME_IDLE_SECS", DEFAULT_RUNTIME_IDLE_SECS),
        }
    }
}
