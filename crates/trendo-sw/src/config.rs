//! Worker configuration.
//!
//! The cache generation tag is injected here instead of being baked into the
//! worker, so staging and production can run distinct tags side by side.

use std::path::Path;

use serde::{Deserialize, Serialize};
use trendo_common::{LogConfig, Result, TrendoError};
use url::Url;

use crate::WorkerError;

/// How top-level page navigations are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationPolicy {
    /// Network first, cached copy only when offline.
    #[default]
    NetworkFirst,
    /// Same as sub-resources (legacy behavior).
    CacheFirst,
}

/// Fixed rendering options for push notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Title used when the payload has none.
    pub default_title: String,
    /// Click destination used when the payload has none.
    pub default_url: String,
    pub icon: String,
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            default_title: "TrendoAI".to_string(),
            default_url: "/".to_string(),
            icon: "/static/img/logo.png".to_string(),
            badge: "/static/img/logo.png".to_string(),
            vibrate: vec![100, 50, 100],
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Cache generation tag. Bumping it invalidates every older generation.
    pub cache_name: String,

    /// Origin the worker controls; relative paths resolve against it.
    pub origin: Url,

    /// Paths stored eagerly at install, in order.
    pub precache: Vec<String>,

    /// Routing for navigations.
    pub navigation: NavigationPolicy,

    /// Activate right after install instead of waiting for controlled pages to close.
    pub skip_waiting: bool,

    /// Push notification rendering.
    pub notifications: NotificationDefaults,

    /// Logging setup for hosts.
    pub logging: LogConfig,
}

const DEFAULT_ORIGIN: &str = "https://trendoai.onrender.com";

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: "trendoai-v2".to_string(),
            origin: default_origin(),
            precache: vec![
                "/static/css/style.css".to_string(),
                "/static/manifest.json".to_string(),
            ],
            navigation: NavigationPolicy::NetworkFirst,
            skip_waiting: true,
            notifications: NotificationDefaults::default(),
            logging: LogConfig::default(),
        }
    }
}

fn default_origin() -> Url {
    Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL")
}

impl WorkerConfig {
    /// The first released behavior: root page precached, navigations cache-first,
    /// no skip-waiting.
    pub fn legacy() -> Self {
        Self {
            cache_name: "trendoai-v1".to_string(),
            precache: vec![
                "/".to_string(),
                "/static/css/style.css".to_string(),
                "/static/manifest.json".to_string(),
            ],
            navigation: NavigationPolicy::CacheFirst,
            skip_waiting: false,
            ..Self::default()
        }
    }

    /// Same configuration under another generation tag.
    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = cache_name.into();
        self
    }

    /// Same configuration for another origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TrendoError::config_with_source("invalid worker config", e))
    }

    /// Read a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TrendoError::config_with_source(format!("reading {}", path.display()), e)
        })?;
        Self::from_json_str(&text)
    }

    /// Read a file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_path(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRENDO_CACHE_NAME`, `TRENDO_ORIGIN` (falling back to `SITE_URL`)
    /// and `TRENDO_SKIP_WAITING`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(name) = lookup("TRENDO_CACHE_NAME") {
            self.cache_name = name;
        }

        if let Some(origin) = lookup("TRENDO_ORIGIN").or_else(|| lookup("SITE_URL")) {
            self.origin = Url::parse(&origin)
                .map_err(|e| TrendoError::config_with_source(format!("bad origin {origin:?}"), e))?;
        }

        if let Some(flag) = lookup("TRENDO_SKIP_WAITING") {
            self.skip_waiting = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(TrendoError::config(format!(
                        "TRENDO_SKIP_WAITING must be a boolean, got {other:?}"
                    )))
                }
            };
        }

        Ok(())
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(TrendoError::config("cache_name must not be empty"));
        }
        if self.origin.cannot_be_a_base() {
            return Err(TrendoError::config(format!(
                "origin {} cannot resolve paths",
                self.origin
            )));
        }
        if let Some(bad) = self.precache.iter().find(|p| !p.starts_with('/')) {
            return Err(TrendoError::config(format!(
                "precache path {bad:?} must start with '/'"
            )));
        }
        Ok(())
    }

    /// Resolve a path (or absolute URL) against the origin.
    pub fn resolve(&self, path: &str) -> std::result::Result<Url, WorkerError> {
        self.origin
            .join(path)
            .map_err(|e| WorkerError::InvalidUrl(format!("{path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_current_behavior() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "trendoai-v2");
        assert_eq!(
            config.precache,
            vec!["/static/css/style.css", "/static/manifest.json"]
        );
        assert_eq!(config.navigation, NavigationPolicy::NetworkFirst);
        assert!(config.skip_waiting);
        assert_eq!(config.notifications.vibrate, vec![100, 50, 100]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_preset() {
        let config = WorkerConfig::legacy();
        assert_eq!(config.cache_name, "trendoai-v1");
        assert_eq!(config.precache[0], "/");
        assert_eq!(config.navigation, NavigationPolicy::CacheFirst);
        assert!(!config.skip_waiting);
    }

    #[test]
    fn test_partial_json() {
        let config = WorkerConfig::from_json_str(
            r#"{"cache_name":"trendoai-staging-v3","navigation":"cache-first","logging":{"format":"json"}}"#,
        )
        .unwrap();
        assert_eq!(config.cache_name, "trendoai-staging-v3");
        assert_eq!(config.navigation, NavigationPolicy::CacheFirst);
        assert_eq!(config.precache.len(), 2);
        assert_eq!(config.logging.format, trendo_common::LogFormat::Json);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = WorkerConfig::from_json_str("{not json").unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"cache_name":"trendoai-v9","skip_waiting":false}"#).unwrap();

        let config = WorkerConfig::from_path(&path).unwrap();
        assert_eq!(config.cache_name, "trendoai-v9");
        assert!(!config.skip_waiting);

        assert!(WorkerConfig::from_path(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = WorkerConfig::default();
        config
            .apply_overrides(lookup(&[
                ("TRENDO_CACHE_NAME", "trendoai-staging-v2"),
                ("SITE_URL", "http://localhost:5000"),
                ("TRENDO_SKIP_WAITING", "no"),
            ]))
            .unwrap();
        assert_eq!(config.cache_name, "trendoai-staging-v2");
        assert_eq!(config.origin.as_str(), "http://localhost:5000/");
        assert!(!config.skip_waiting);
    }

    #[test]
    fn test_trendo_origin_wins_over_site_url() {
        let mut config = WorkerConfig::default();
        config
            .apply_overrides(lookup(&[
                ("TRENDO_ORIGIN", "https://staging.trendo.ai"),
                ("SITE_URL", "http://localhost:5000"),
            ]))
            .unwrap();
        assert_eq!(config.origin.host_str(), Some("staging.trendo.ai"));
    }

    #[test]
    fn test_bad_overrides() {
        let mut config = WorkerConfig::default();
        assert!(config
            .apply_overrides(lookup(&[("TRENDO_SKIP_WAITING", "maybe")]))
            .is_err());
        assert!(config
            .apply_overrides(lookup(&[("TRENDO_ORIGIN", "not a url")]))
            .is_err());
    }

    #[test]
    fn test_validate() {
        let empty = WorkerConfig::default().with_cache_name("  ");
        assert!(empty.validate().is_err());

        let mut relative = WorkerConfig::default();
        relative.precache.push("static/js/app.js".to_string());
        assert!(relative.validate().is_err());
    }

    #[test]
    fn test_resolve() {
        let config = WorkerConfig::default().with_origin(Url::parse("https://trendo.ai").unwrap());
        assert_eq!(
            config.resolve("/dashboard").unwrap().as_str(),
            "https://trendo.ai/dashboard"
        );
        assert_eq!(
            config.resolve("https://t.me/trendoai").unwrap().as_str(),
            "https://t.me/trendoai"
        );
    }
}
