//! Environment-variable configuration surface (spec §6).
//!
//! Unlike the gateway this crate's lineage also shipped, there is no config
//! file here — every recognized option is read straight from the process
//! environment, the way `apply_env_overrides` layered values on top of a
//! loaded TOML file upstream. Here that's the only layer.

use crate::common::duration_serde::parse_duration_string;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PrimaryConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub text_timeout: Duration,
    pub health_timeout: Duration,
    pub rate_limit_per_min: u32,
    pub default_model: String,
}

#[derive(Debug, Clone)]
pub struct SecondaryConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub text_timeout: Duration,
    pub health_timeout: Duration,
    pub rate_limit_per_min: u32,
    pub default_model: String,
    pub site_url: Option<String>,
    pub app_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DynamicTimeoutConfig {
    pub enabled: bool,
    pub min: Duration,
    pub max: Duration,
    pub history_size: usize,
    pub monitoring_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct FallbackRestoreConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub primary: PrimaryConfig,
    pub secondary: SecondaryConfig,
    pub dynamic_timeout: DynamicTimeoutConfig,
    pub fallback_restore: FallbackRestoreConfig,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://text.pollinations.ai".to_string(),
            api_token: None,
            text_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            rate_limit_per_min: 15,
            default_model: "evil".to_string(),
        }
    }
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            text_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            rate_limit_per_min: 20,
            default_model: "nvidia/nemotron-nano-9b-v2:free".to_string(),
            site_url: None,
            app_name: None,
        }
    }
}

impl Default for DynamicTimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min: Duration::from_secs(5),
            max: Duration::from_secs(60),
            history_size: 100,
            monitoring_enabled: true,
        }
    }
}

impl Default for FallbackRestoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary: PrimaryConfig::default(),
            secondary: SecondaryConfig::default(),
            dynamic_timeout: DynamicTimeoutConfig::default(),
            fallback_restore: FallbackRestoreConfig::default(),
        }
    }
}

impl Config {
    /// Build configuration from the process environment, falling back to
    /// the defaults above for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = env_var("PRIMARY_TEXT_API") {
            self.primary.base_url = v;
        }
        if let Ok(v) = env_var("PRIMARY_API_TOKEN") {
            self.primary.api_token = Some(v);
        }
        if let Ok(v) = env_var("PRIMARY_TEXT_TIMEOUT") {
            self.primary.text_timeout = parse_duration_string(&v)?;
        }
        if let Ok(v) = env_var("PRIMARY_HEALTH_TIMEOUT") {
            self.primary.health_timeout = parse_duration_string(&v)?;
        }
        if let Ok(v) = env_var("PRIMARY_RATE_LIMIT_PER_MIN") {
            self.primary.rate_limit_per_min = v
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid PRIMARY_RATE_LIMIT_PER_MIN: {v}"))?;
        }
        if let Ok(v) = env_var("PRIMARY_DEFAULT_MODEL") {
            self.primary.default_model = v;
        }

        if let Ok(v) = env_var("SECONDARY_ENABLED") {
            self.secondary.enabled = parse_bool(&v)?;
        }
        if let Ok(v) = env_var("SECONDARY_API_URL") {
            self.secondary.base_url = v;
        }
        if let Ok(v) = env_var("SECONDARY_API_KEY") {
            self.secondary.api_key = Some(v);
        }
        if let Ok(v) = env_var("SECONDARY_TEXT_TIMEOUT") {
            self.secondary.text_timeout = parse_duration_string(&v)?;
        }
        if let Ok(v) = env_var("SECONDARY_HEALTH_TIMEOUT") {
            self.secondary.health_timeout = parse_duration_string(&v)?;
        }
        if let Ok(v) = env_var("SECONDARY_RATE_LIMIT_PER_MIN") {
            self.secondary.rate_limit_per_min = v
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid SECONDARY_RATE_LIMIT_PER_MIN: {v}"))?;
        }
        if let Ok(v) = env_var("SECONDARY_DEFAULT_MODEL") {
            self.secondary.default_model = v;
        }
        if let Ok(v) = env_var("SECONDARY_SITE_URL") {
            self.secondary.site_url = Some(v);
        }
        if let Ok(v) = env_var("SECONDARY_APP_NAME") {
            self.secondary.app_name = Some(v);
        }

        if let Ok(v) = env_var("DYNAMIC_TIMEOUT_ENABLED") {
            self.dynamic_timeout.enabled = parse_bool(&v)?;
        }
        if let Ok(v) = env_var("DYNAMIC_TIMEOUT_MIN") {
            self.dynamic_timeout.min = parse_duration_string(&v)?;
        }
        if let Ok(v) = env_var("DYNAMIC_TIMEOUT_MAX") {
            self.dynamic_timeout.max = parse_duration_string(&v)?;
        }
        if let Ok(v) = env_var("TIMEOUT_HISTORY_SIZE") {
            self.dynamic_timeout.history_size = v
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid TIMEOUT_HISTORY_SIZE: {v}"))?;
        }
        if let Ok(v) = env_var("TIMEOUT_MONITORING_ENABLED") {
            self.dynamic_timeout.monitoring_enabled = parse_bool(&v)?;
        }

        if let Ok(v) = env_var("FALLBACK_RESTORE_ENABLED") {
            self.fallback_restore.enabled = parse_bool(&v)?;
        }
        if let Ok(v) = env_var("FALLBACK_RESTORE_TIMEOUT_SECONDS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid FALLBACK_RESTORE_TIMEOUT_SECONDS: {v}"))?;
            self.fallback_restore.timeout = Duration::from_secs(secs);
        }

        Ok(())
    }
}

fn env_var(key: &str) -> Result<String, std::env::VarError> {
    let v = std::env::var(key)?;
    if v.is_empty() {
        Err(std::env::VarError::NotPresent)
    } else {
        Ok(v)
    }
}

fn parse_bool(v: &str) -> anyhow::Result<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("invalid boolean value: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.primary.rate_limit_per_min, 15);
        assert!(config.fallback_restore.enabled);
        assert_eq!(config.fallback_restore.timeout, Duration::from_secs(60));
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("PRIMARY_DEFAULT_MODEL", "custom-model");
        std::env::set_var("FALLBACK_RESTORE_TIMEOUT_SECONDS", "120");
        let config = Config::from_env().unwrap();
        assert_eq!(config.primary.default_model, "custom-model");
        assert_eq!(config.fallback_restore.timeout, Duration::from_secs(120));
        std::env::remove_var("PRIMARY_DEFAULT_MODEL");
        std::env::remove_var("FALLBACK_RESTORE_TIMEOUT_SECONDS");
    }

    #[test]
    fn empty_env_value_is_treated_as_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("PRIMARY_DEFAULT_MODEL", "");
        let config = Config::from_env().unwrap();
        assert_eq!(config.primary.default_model, "evil");
        std::env::remove_var("PRIMARY_DEFAULT_MODEL");
    }
}
