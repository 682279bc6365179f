use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::ShimError;

pub const DEFAULT_BASE_URL: &str = "https://app.lognormal.com";

/// Runtime settings: an optional `ln_shim.toml` in the working directory,
/// overridden by `LN_SHIM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub domain: Option<String>,
    /// Value of the dashboard's `_laptime_session` cookie.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_throttle_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            domain: None,
            cookie: None,
            base_url: default_base_url(),
            throttle_ms: default_throttle_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("ln_shim").required(false))
            .add_source(Environment::with_prefix("LN_SHIM").try_parsing(true))
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    /// `(cookie, domain)`, or the first one missing. Blank counts as missing.
    pub fn credentials(&self) -> Result<(&str, &str), ShimError> {
        let cookie = present(&self.cookie).ok_or(ShimError::NoCookie)?;
        Ok((cookie, self.domain()?))
    }

    pub fn domain(&self) -> Result<&str, ShimError> {
        present(&self.domain).ok_or(ShimError::NoDomain)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(src: &str) -> Settings {
        let config = Config::builder()
            .add_source(File::from_str(src, FileFormat::Toml))
            .build()
            .unwrap();
        Settings::from_config(config).unwrap()
    }

    #[test]
    fn defaults_fill_the_gaps() {
        let s = from_toml("domain = \"example.com\"");
        assert_eq!(s.domain.as_deref(), Some("example.com"));
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.throttle(), Duration::from_secs(1));
        assert_eq!(s.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn overrides() {
        let s = from_toml(
            "cookie = \"abc\"\ndomain = \"example.com\"\nbase_url = \"http://localhost:8080\"\nthrottle_ms = 0\ntimeout_secs = 5",
        );
        assert_eq!(s.credentials().unwrap(), ("abc", "example.com"));
        assert_eq!(s.base_url, "http://localhost:8080");
        assert!(s.throttle().is_zero());
    }

    #[test]
    fn cookie_is_checked_before_domain() {
        let s = Settings::default();
        assert!(matches!(s.credentials(), Err(ShimError::NoCookie)));

        let s = Settings {
            cookie: Some("abc".into()),
            domain: Some("  ".into()),
            ..Settings::default()
        };
        assert_eq!(s.credentials().unwrap_err().code().as_u8(), 3);
    }
}
