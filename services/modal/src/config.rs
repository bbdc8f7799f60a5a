//! Service configuration

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::channel::{ChannelConfig, DEFAULT_API_BASE};
use crate::router::DEFAULT_SESSION_TTL_SECONDS;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3002";
pub const DEFAULT_SWEEP_SCHEDULE: &str = "0 */5 * * * *";
pub const DEFAULT_SWEEP_GRACE_SECONDS: i64 = 60 * 60;
pub const MAX_SWEEP_GRACE_SECONDS: i64 = 365 * 24 * 60 * 60;
const DEFAULT_CHANNEL_TIMEOUT_SECONDS: u64 = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings for the modal service
///
/// # Environment Variables
/// - `MODAL_BIND_ADDR`: listen address (default: 0.0.0.0:3002)
/// - `DISCORD_API_BASE`: REST base URL (default: https://discord.com/api/v10)
/// - `DISCORD_APPLICATION_ID`: application id used for follow-ups (required)
/// - `MODAL_CHANNEL_TIMEOUT_SECONDS`: per-call budget for channel requests (default: 8)
/// - `MODAL_SESSION_TTL_SECONDS`: lifetime of new sessions (default: 900)
/// - `MODAL_SWEEP_SCHEDULE`: cron expression for the sweep job (default: every 5 minutes)
/// - `MODAL_SWEEP_GRACE_SECONDS`: how long stale sessions are kept, at most a year (default: 3600)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub api_base: String,
    pub application_id: String,
    pub channel_timeout: Duration,
    pub session_ttl_seconds: i64,
    pub sweep_schedule: String,
    pub sweep_grace_seconds: i64,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let application_id = env::var("DISCORD_APPLICATION_ID")
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::Missing("DISCORD_APPLICATION_ID"))?;

        let channel_timeout_seconds: u64 =
            parse_var("MODAL_CHANNEL_TIMEOUT_SECONDS", DEFAULT_CHANNEL_TIMEOUT_SECONDS)?;
        if channel_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                name: "MODAL_CHANNEL_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        let session_ttl_seconds = parse_var("MODAL_SESSION_TTL_SECONDS", DEFAULT_SESSION_TTL_SECONDS)?;
        let sweep_grace_seconds = parse_var("MODAL_SWEEP_GRACE_SECONDS", DEFAULT_SWEEP_GRACE_SECONDS)?;
        if !(0..=MAX_SWEEP_GRACE_SECONDS).contains(&sweep_grace_seconds) {
            return Err(ConfigError::Invalid {
                name: "MODAL_SWEEP_GRACE_SECONDS",
                value: sweep_grace_seconds.to_string(),
            });
        }

        Ok(Self {
            bind_addr: env::var("MODAL_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            api_base: env::var("DISCORD_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            application_id,
            channel_timeout: Duration::from_secs(channel_timeout_seconds),
            session_ttl_seconds,
            sweep_schedule: env::var("MODAL_SWEEP_SCHEDULE")
                .unwrap_or_else(|_| DEFAULT_SWEEP_SCHEDULE.to_string()),
            sweep_grace_seconds,
        })
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            api_base: self.api_base.clone(),
            application_id: self.application_id.clone(),
            timeout: self.channel_timeout,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        unsafe {
            for name in [
                "MODAL_BIND_ADDR",
                "DISCORD_API_BASE",
                "DISCORD_APPLICATION_ID",
                "MODAL_CHANNEL_TIMEOUT_SECONDS",
                "MODAL_SESSION_TTL_SECONDS",
                "MODAL_SWEEP_SCHEDULE",
                "MODAL_SWEEP_GRACE_SECONDS",
            ] {
                std::env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_application_id_is_required() {
        clear_env();
        assert_eq!(
            ServiceConfig::from_env().unwrap_err(),
            ConfigError::Missing("DISCORD_APPLICATION_ID")
        );
    }

    #[test]
    #[serial]
    fn test_service_config_defaults() {
        clear_env();
        unsafe {
            std::env::set_var("DISCORD_APPLICATION_ID", "42");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.application_id, "42");
        assert_eq!(config.channel_timeout, Duration::from_secs(8));
        assert_eq!(config.session_ttl_seconds, 900);
        assert_eq!(config.sweep_schedule, DEFAULT_SWEEP_SCHEDULE);
        assert_eq!(config.sweep_grace_seconds, 3600);

        let channel = config.channel_config();
        assert_eq!(channel.application_id, "42");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_service_config_custom_values() {
        clear_env();
        unsafe {
            std::env::set_var("DISCORD_APPLICATION_ID", "42");
            std::env::set_var("MODAL_BIND_ADDR", "127.0.0.1:9000");
            std::env::set_var("MODAL_CHANNEL_TIMEOUT_SECONDS", "3");
            std::env::set_var("MODAL_SESSION_TTL_SECONDS", "120");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.channel_timeout, Duration::from_secs(3));
        assert_eq!(config.session_ttl_seconds, 120);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_service_config_rejects_bad_numbers() {
        clear_env();
        unsafe {
            std::env::set_var("DISCORD_APPLICATION_ID", "42");
            std::env::set_var("MODAL_CHANNEL_TIMEOUT_SECONDS", "soon");
        }

        assert!(matches!(
            ServiceConfig::from_env(),
            Err(ConfigError::Invalid { name: "MODAL_CHANNEL_TIMEOUT_SECONDS", .. })
        ));

        unsafe {
            std::env::set_var("MODAL_CHANNEL_TIMEOUT_SECONDS", "0");
        }
        assert!(ServiceConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_service_config_bounds_sweep_grace() {
        clear_env();
        unsafe {
            std::env::set_var("DISCORD_APPLICATION_ID", "42");
            std::env::set_var("MODAL_SWEEP_GRACE_SECONDS", i64::MAX.to_string());
        }
        assert_eq!(
            ServiceConfig::from_env().unwrap_err(),
            ConfigError::Invalid {
                name: "MODAL_SWEEP_GRACE_SECONDS",
                value: i64::MAX.to_string(),
            }
        );

        unsafe {
            std::env::set_var("MODAL_SWEEP_GRACE_SECONDS", "-1");
        }
        assert!(ServiceConfig::from_env().is_err());

        unsafe {
            std::env::set_var("MODAL_SWEEP_GRACE_SECONDS", MAX_SWEEP_GRACE_SECONDS.to_string());
        }
        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.sweep_grace_seconds, MAX_SWEEP_GRACE_SECONDS);
        // Converting the accepted value must not overflow
        assert_eq!(
            chrono::Duration::seconds(config.sweep_grace_seconds).num_days(),
            365
        );

        clear_env();
    }
}
