//! Application configuration management.
//!
//! Configuration is stored at `~/.config/handoff/config.json`. Missing
//! fields take their defaults, and `HANDOFF_*` environment variables
//! override whatever was loaded.

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::handoff::DEFAULT_TRANSFER_TTL_MS;
use crate::models::AppId;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "handoff";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Accepted ranges for the numeric settings. Values outside fall back to
/// the default.
const TRANSFER_TTL_MS_RANGE: RangeInclusive<i64> = 1..=86_400_000;
const POLL_INTERVAL_SECS_RANGE: RangeInclusive<u64> = 1..=86_400;
const RENEW_MIN_VALIDITY_SECS_RANGE: RangeInclusive<i64> = 0..=86_400;

/// What a failed handoff check means for the page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffPolicy {
    /// Report the result, redirect to login regardless.
    #[default]
    Advisory,
    /// Only redirect to login when the handoff token checks out.
    Enforced,
}

impl HandoffPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advisory" => Some(Self::Advisory),
            "enforced" => Some(Self::Enforced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    pub url: String,
    pub realm: String,
    pub client_id: String,
    pub redirect_uri: String,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            url: "http://eservice.localhost/auth".to_string(),
            realm: "agency-realm".to_string(),
            client_id: "aceas-spa".to_string(),
            redirect_uri: "http://eservice.localhost/aceas/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_a_url: String,
    pub app_b_url: String,
    pub gateway_url: String,
    pub oidc: OidcConfig,
    pub transfer_ttl_ms: i64,
    pub poll_interval_secs: u64,
    pub renew_min_validity_secs: i64,
    pub handoff_policy: HandoffPolicy,
    /// Keep credentials in the OS keychain instead of the cache dir
    pub use_keyring: bool,
    pub log_to_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_a_url: "http://eservice.localhost/aceas/".to_string(),
            app_b_url: "http://eservice.localhost/cpds/".to_string(),
            gateway_url: "http://eservice.localhost/".to_string(),
            oidc: OidcConfig::default(),
            transfer_ttl_ms: DEFAULT_TRANSFER_TTL_MS,
            poll_interval_secs: 60,
            renew_min_validity_secs: 30,
            handoff_policy: HandoffPolicy::default(),
            use_keyring: false,
            log_to_file: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        config.normalize();
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply `HANDOFF_*` overrides. Unparseable numbers are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HANDOFF_APP_A_URL") {
            self.app_a_url = v;
        }
        if let Some(v) = lookup("HANDOFF_APP_B_URL") {
            self.app_b_url = v;
        }
        if let Some(v) = lookup("HANDOFF_GATEWAY_URL") {
            self.gateway_url = v;
        }
        if let Some(v) = lookup("HANDOFF_OIDC_URL") {
            self.oidc.url = v;
        }
        if let Some(v) = lookup("HANDOFF_OIDC_REALM") {
            self.oidc.realm = v;
        }
        if let Some(v) = lookup("HANDOFF_OIDC_CLIENT_ID") {
            self.oidc.client_id = v;
        }
        if let Some(v) = lookup("HANDOFF_OIDC_REDIRECT_URI") {
            self.oidc.redirect_uri = v;
        }
        parse_in_range(
            &lookup,
            "HANDOFF_TRANSFER_TTL_MS",
            &mut self.transfer_ttl_ms,
            TRANSFER_TTL_MS_RANGE,
        );
        parse_in_range(
            &lookup,
            "HANDOFF_POLL_INTERVAL_SECS",
            &mut self.poll_interval_secs,
            POLL_INTERVAL_SECS_RANGE,
        );
        parse_in_range(
            &lookup,
            "HANDOFF_RENEW_MIN_VALIDITY_SECS",
            &mut self.renew_min_validity_secs,
            RENEW_MIN_VALIDITY_SECS_RANGE,
        );
        if let Some(v) = lookup("HANDOFF_POLICY") {
            match HandoffPolicy::parse(&v) {
                Some(policy) => self.handoff_policy = policy,
                None => warn!(value = %v, "Ignoring unknown HANDOFF_POLICY"),
            }
        }
        parse_into(&lookup, "HANDOFF_USE_KEYRING", &mut self.use_keyring);
        parse_into(&lookup, "HANDOFF_LOG_TO_FILE", &mut self.log_to_file);
    }

    /// Reset numeric settings outside their accepted range to the default.
    pub fn normalize(&mut self) {
        let defaults = Self::default();
        clamp_to_default(
            "transfer_ttl_ms",
            &mut self.transfer_ttl_ms,
            defaults.transfer_ttl_ms,
            TRANSFER_TTL_MS_RANGE,
        );
        clamp_to_default(
            "poll_interval_secs",
            &mut self.poll_interval_secs,
            defaults.poll_interval_secs,
            POLL_INTERVAL_SECS_RANGE,
        );
        clamp_to_default(
            "renew_min_validity_secs",
            &mut self.renew_min_validity_secs,
            defaults.renew_min_validity_secs,
            RENEW_MIN_VALIDITY_SECS_RANGE,
        );
    }

    /// Base URL an application is served from.
    pub fn base_url(&self, app: AppId) -> &str {
        match app {
            AppId::AppA => &self.app_a_url,
            AppId::AppB => &self.app_b_url,
        }
    }

    fn cache_root() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Per-application cache directory for persistent credential material.
    pub fn cache_dir(&self, app: AppId) -> Result<PathBuf> {
        Ok(Self::cache_root()?.join(app.as_str()))
    }

    /// Session storage shared by both applications, standing in for the
    /// browser tab's session storage.
    pub fn session_path(&self) -> Result<PathBuf> {
        Ok(Self::cache_root()?.join("session.json"))
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, "Ignoring unparseable override"),
    }
}

fn parse_in_range<F, T>(lookup: &F, key: &str, target: &mut T, range: RangeInclusive<T>)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Display + Copy,
{
    let current = *target;
    parse_into(lookup, key, target);
    if !range.contains(target) {
        warn!(key, value = %target, "Ignoring out-of-range override");
        *target = current;
    }
}

fn clamp_to_default<T>(name: &str, value: &mut T, default: T, range: RangeInclusive<T>)
where
    T: PartialOrd + Display,
{
    if !range.contains(value) {
        warn!(setting = name, value = %value, "Out of range, using default");
        *value = default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.transfer_ttl_ms, 30_000);
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.renew_min_validity_secs, 30);
        assert_eq!(config.handoff_policy, HandoffPolicy::Advisory);
        assert_eq!(config.base_url(AppId::AppB), "http://eservice.localhost/cpds/");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"handoff_policy": "enforced", "transfer_ttl_ms": 5000}"#)
                .unwrap();
        assert_eq!(config.handoff_policy, HandoffPolicy::Enforced);
        assert_eq!(config.transfer_ttl_ms, 5000);
        assert_eq!(config.gateway_url, "http://eservice.localhost/");
        assert_eq!(config.oidc.realm, "agency-realm");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_from(env(&[
            ("HANDOFF_GATEWAY_URL", "https://gw.example/"),
            ("HANDOFF_TRANSFER_TTL_MS", "10000"),
            ("HANDOFF_POLICY", "Enforced"),
            ("HANDOFF_USE_KEYRING", "true"),
            ("HANDOFF_OIDC_REALM", "other"),
        ]));
        assert_eq!(config.gateway_url, "https://gw.example/");
        assert_eq!(config.transfer_ttl_ms, 10_000);
        assert_eq!(config.handoff_policy, HandoffPolicy::Enforced);
        assert!(config.use_keyring);
        assert_eq!(config.oidc.realm, "other");
    }

    #[test]
    fn test_bad_env_values_ignored() {
        let mut config = Config::default();
        config.apply_env_from(env(&[
            ("HANDOFF_POLL_INTERVAL_SECS", "soon"),
            ("HANDOFF_POLICY", "strict"),
        ]));
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.handoff_policy, HandoffPolicy::Advisory);
    }

    #[test]
    fn test_out_of_range_env_values_ignored() {
        let mut config = Config::default();
        config.apply_env_from(env(&[
            ("HANDOFF_POLL_INTERVAL_SECS", "0"),
            ("HANDOFF_RENEW_MIN_VALIDITY_SECS", "9223372036854775807"),
            ("HANDOFF_TRANSFER_TTL_MS", "-1"),
        ]));
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.renew_min_validity_secs, 30);
        assert_eq!(config.transfer_ttl_ms, 30_000);
    }

    #[test]
    fn test_out_of_range_file_values_reset() {
        let mut config: Config = serde_json::from_str(
            r#"{"poll_interval_secs": 0, "renew_min_validity_secs": -4, "transfer_ttl_ms": 5000}"#,
        )
        .unwrap();
        config.normalize();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.renew_min_validity_secs, 30);
        assert_eq!(config.transfer_ttl_ms, 5000);
    }
}
