//! Global configuration for the orchestrator.
//!
//! Mirrors the teacher's layered `GlobalConfig`/`ConfigManager` split: a pure
//! config struct at the lowest layer (Design Notes "cyclic references between
//! modules" — logging must not depend on settings which depend on logging),
//! loaded once by the composition root and handed to components as an
//! `Arc<OrchestratorConfig>` rather than read through a global on every call.
//!
//! Configuration is loaded, in increasing precedence, from: built-in
//! defaults, `config.toml` (or the path in `ORCH_CONFIG_PATH`), then
//! `ORCH_`-prefixed environment variables.

use crate::error::{OrchError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "ORCH_";
pub const ENV_CONFIG_PATH: &str = "ORCH_CONFIG_PATH";
pub const ENV_CONFIG_PROFILE: &str = "ORCH_PROFILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigProfile {
    #[default]
    Dev,
    Prod,
    Test,
}

impl ConfigProfile {
    pub fn from_env() -> Self {
        std::env::var(ENV_CONFIG_PROFILE)
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "dev" => Some(Self::Dev),
                "prod" => Some(Self::Prod),
                "test" => Some(Self::Test),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub log_format: String,
    pub profile: ConfigProfile,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            profile: ConfigProfile::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            worker_count: 4,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateStoreConfig {
    /// `memory` for the in-process store, `sqlite` for the durable store.
    pub backend: String,
    pub sqlite_path: PathBuf,
    pub lock_ttl_secs: u64,
    pub lock_acquire_timeout_secs: u64,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            sqlite_path: PathBuf::from("orchestrator.sqlite"),
            lock_ttl_secs: 30,
            lock_acquire_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_failure_threshold: u32,
    pub circuit_half_open_max: u32,
    pub circuit_success_threshold: u32,
    pub circuit_timeout_secs: u64,
    pub default_max_retries: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_failure_threshold: 5,
            circuit_half_open_max: 3,
            circuit_success_threshold: 2,
            circuit_timeout_secs: 60,
            default_max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub general: GeneralConfig,
    pub server: ServerConfig,
    pub state_store: StateStoreConfig,
    pub resilience: ResilienceConfig,
}

impl OrchestratorConfig {
    /// Load defaults, layer `config.toml`/the env-pointed path if present,
    /// then apply `ORCH_`-prefixed environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(ENV_CONFIG_PATH)
            .unwrap_or_else(|_| "config.toml".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(|e| {
                OrchError::Validation(format!("invalid default configuration: {e}"))
            })?);

        if PathBuf::from(&config_path).exists() {
            builder = builder.add_source(config::File::with_name(&config_path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX.trim_end_matches('_'))
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| OrchError::Validation(format!("failed to load configuration: {e}")))?;

        raw.try_deserialize()
            .map_err(|e| OrchError::Validation(format!("failed to parse configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.resilience.circuit_failure_threshold, 5);
        assert_eq!(cfg.state_store.backend, "memory");
    }
}
