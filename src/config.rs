//! Engine configuration, from `config/config.toml` and `SCHEMAGUARD_*`
//! environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum wait for the schema advisory lock.
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
    /// Lifetime of a published idempotent result.
    #[serde(default = "default_idempotency_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,
    /// Total wait budget for a request that lost the idempotency claim.
    #[serde(default = "default_idempotency_wait_ms")]
    pub idempotency_wait_ms: u64,
    /// Poll interval while waiting on another request's result.
    #[serde(default = "default_idempotency_poll_ms")]
    pub idempotency_poll_ms: u64,
}

fn default_lock_timeout_seconds() -> u64 {
    60
}

fn default_idempotency_ttl_seconds() -> u64 {
    600
}

fn default_idempotency_wait_ms() -> u64 {
    1500
}

fn default_idempotency_poll_ms() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_seconds: default_lock_timeout_seconds(),
            idempotency_ttl_seconds: default_idempotency_ttl_seconds(),
            idempotency_wait_ms: default_idempotency_wait_ms(),
            idempotency_poll_ms: default_idempotency_poll_ms(),
        }
    }
}

impl EngineConfig {
    /// Load the engine configuration from `config/config.toml`, falling back
    /// to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("SCHEMAGUARD").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!(
                        "failed to load config file, falling back to env: {}",
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix("SCHEMAGUARD").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // the engine section is optional; defaults cover every field
        match settings.get::<EngineConfig>("engine") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(EngineConfig::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Engine configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn idempotency_settings(&self) -> crate::idempotency::IdempotencySettings {
        crate::idempotency::IdempotencySettings {
            result_ttl: Duration::from_secs(self.idempotency_ttl_seconds),
            wait_budget: Duration::from_millis(self.idempotency_wait_ms),
            poll_interval: Duration::from_millis(self.idempotency_poll_ms),
        }
    }
}
