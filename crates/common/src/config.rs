//! Environment-sourced runtime configuration.
//!
//! Every knob in `§6` of the spec is read once, at process start, with a documented
//! default. Nothing in this module touches the environment again after [`RuntimeConfig::from_env`]
//! returns.

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Base URL of the downstream agent service.
    pub agent_service_url: String,
    /// Per-turn wall-clock timeout for the upstream adapter.
    pub run_timeout_seconds: u64,
    /// Heartbeat interval for the SSE stream reader.
    pub sse_heartbeat_seconds: u64,
    /// Lease TTL for the turn coordinator.
    pub run_lock_ttl_seconds: u64,
    /// Lease refresh period; enforced to be at most a third of the TTL.
    pub run_lock_refresh_seconds: u64,
    /// TTL for cancel markers.
    pub cancel_ttl_seconds: u64,
    /// Postgres connection string backing the run store.
    pub database_url: String,
    /// Redis connection string backing the coordinator.
    pub redis_url: String,
    /// Address the HTTP API binds to.
    pub http_bind_addr: String,
    /// Default tracing filter directive.
    pub log_level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("{var} must be set")]
    Missing { var: &'static str },
}

impl RuntimeConfig {
    /// Load configuration from the environment, applying the defaults documented in the spec.
    ///
    /// Fails fast if a required variable is missing or a numeric variable doesn't parse, and if
    /// `run_lock_refresh_seconds` exceeds a third of `run_lock_ttl_seconds` (the lease TTL must
    /// tolerate at least one missed refresh).
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_lock_ttl_seconds = env_u64("RUN_LOCK_TTL_SECONDS", 90)?;
        let run_lock_refresh_seconds = env_u64("RUN_LOCK_REFRESH_SECONDS", 30)?;

        if run_lock_refresh_seconds > run_lock_ttl_seconds / 3 {
            return Err(ConfigError::InvalidValue {
                var: "RUN_LOCK_REFRESH_SECONDS",
                reason: format!(
                    "must be at most a third of RUN_LOCK_TTL_SECONDS ({run_lock_ttl_seconds}), got {run_lock_refresh_seconds}"
                ),
            });
        }

        Ok(Self {
            agent_service_url: env_required("AGENT_SERVICE_URL")?,
            run_timeout_seconds: env_u64("RUN_TIMEOUT_SECONDS", 300)?,
            sse_heartbeat_seconds: env_u64("SSE_HEARTBEAT_SECONDS", 15)?,
            run_lock_ttl_seconds,
            run_lock_refresh_seconds,
            cancel_ttl_seconds: env_u64("CANCEL_TTL_SECONDS", 900)?,
            database_url: env_required("DATABASE_URL")?,
            redis_url: env_required("REDIS_URL")?,
            http_bind_addr: env_or("HTTP_BIND_ADDR", "0.0.0.0:8080"),
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }

    pub fn sse_heartbeat(&self) -> Duration {
        Duration::from_secs(self.sse_heartbeat_seconds)
    }

    pub fn run_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.run_lock_ttl_seconds)
    }

    pub fn run_lock_refresh(&self) -> Duration {
        Duration::from_secs(self.run_lock_refresh_seconds)
    }

    pub fn cancel_ttl(&self) -> Duration {
        Duration::from_secs(self.cancel_ttl_seconds)
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing { var })
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            reason: format!("expected an integer, got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "AGENT_SERVICE_URL",
            "RUN_TIMEOUT_SECONDS",
            "SSE_HEARTBEAT_SECONDS",
            "RUN_LOCK_TTL_SECONDS",
            "RUN_LOCK_REFRESH_SECONDS",
            "CANCEL_TTL_SECONDS",
            "DATABASE_URL",
            "REDIS_URL",
            "HTTP_BIND_ADDR",
            "LOG_LEVEL",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn fails_fast_when_required_vars_are_missing() {
        clear_env();
        let err = RuntimeConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { var: "AGENT_SERVICE_URL" }));
    }

    #[test]
    #[serial]
    fn applies_documented_defaults() {
        clear_env();
        env::set_var("AGENT_SERVICE_URL", "http://agent.local");
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("REDIS_URL", "redis://localhost");

        let config = RuntimeConfig::from_env().unwrap();
        assert_eq!(config.run_timeout_seconds, 300);
        assert_eq!(config.sse_heartbeat_seconds, 15);
        assert_eq!(config.run_lock_ttl_seconds, 90);
        assert_eq!(config.run_lock_refresh_seconds, 30);
        assert_eq!(config.cancel_ttl_seconds, 900);
        assert_eq!(config.http_bind_addr, "0.0.0.0:8080");
        clear_env();
    }

    #[test]
    #[serial]
    fn rejects_a_refresh_period_too_close_to_the_ttl() {
        clear_env();
        env::set_var("AGENT_SERVICE_URL", "http://agent.local");
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("REDIS_URL", "redis://localhost");
        env::set_var("RUN_LOCK_TTL_SECONDS", "30");
        env::set_var("RUN_LOCK_REFRESH_SECONDS", "20");

        let err = RuntimeConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var: "RUN_LOCK_REFRESH_SECONDS", .. }
        ));
        clear_env();
    }
}
