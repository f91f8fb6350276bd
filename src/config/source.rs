//! Typed key/value lookup with default fallback.
//!
//! # Responsibilities
//! - Read raw string values by key (process environment or in-memory map)
//! - Parse them into typed values, falling back to a default when unset
//!
//! # Design Decisions
//! - An unset key is never an error; an unparseable one always is
//! - The trait is object-safe so the container can share `Arc<dyn ConfigSource>`

use std::collections::HashMap;
use std::str::FromStr;

use crate::config::loader::ConfigError;

/// A source of raw configuration values.
pub trait ConfigSource: Send + Sync {
    /// Raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_int(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        parse_or(self.get(key), key, default)
    }

    fn get_float(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        parse_or(self.get(key), key, default)
    }

    /// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory source, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for MapSource
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_keys_fall_back_to_default() {
        let source = MapSource::new();
        assert_eq!(source.get_string("HTTP_HOST", "localhost"), "localhost");
        assert_eq!(source.get_int("HTTP_PORT", 8080).unwrap(), 8080);
        assert!(source.get_bool("METRICS_ENABLED", true).unwrap());
        assert_eq!(source.get_float("RATIO", 0.5).unwrap(), 0.5);
    }

    #[test]
    fn present_keys_are_parsed() {
        let source = MapSource::new()
            .with("HTTP_PORT", " 9000 ")
            .with("METRICS_ENABLED", "off")
            .with("RATIO", "0.25");
        assert_eq!(source.get_int("HTTP_PORT", 8080).unwrap(), 9000);
        assert!(!source.get_bool("METRICS_ENABLED", true).unwrap());
        assert_eq!(source.get_float("RATIO", 0.5).unwrap(), 0.25);
    }

    #[test]
    fn unparseable_value_names_the_key() {
        let source = MapSource::new().with("HTTP_PORT", "eighty");
        let err = source.get_int("HTTP_PORT", 8080).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "HTTP_PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other}"),
        }

        let source = MapSource::new().with("SHUTDOWN_HANDLE_SIGNALS", "maybe");
        assert!(source.get_bool("SHUTDOWN_HANDLE_SIGNALS", true).is_err());
    }
}
