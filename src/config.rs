use std::env;
use std::str::FromStr;

use crate::classifier::{DEFAULT_CLASSIFIER_THRESHOLD, DEFAULT_CLASSIFIER_TIMEOUT_SECS};
use crate::streaming::{PipelineConfig, SessionSettings, DEFAULT_BAUD_RATE};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// PostgreSQL database URL; sessions are kept in memory when unset
    pub database_url: Option<String>,
    /// Classifier `/predict` endpoint; classifier calls are skipped when unset
    pub classifier_url: Option<String>,
    pub classifier_threshold: f64,
    pub classifier_timeout_secs: u64,
    /// Live display window in seconds
    pub window_seconds: f64,
    pub broadcast_interval_ms: u64,
    pub persist_interval_secs: u64,
    pub external_flush_secs: u64,
    pub ingest_queue_capacity: usize,
    pub analytics_capacity: usize,
    /// Rate clamp for live payloads, `None` disables it
    pub max_rate: Option<f64>,
    /// Serial device of the heart-rate channel
    pub bpm_port: Option<String>,
    /// Serial device of the uterine-activity channel
    pub uterus_port: Option<String>,
    pub baud_rate: u32,
    /// Emulator command template with `{dataset}` and `{number}` placeholders
    pub emulator_command: Option<String>,
    /// CORS allowed origins (comma-separated in env var, `*` for any)
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = PipelineConfig::default();

        let window_seconds: f64 = parse_or(&var, "WINDOW_SECONDS", defaults.window_seconds)?;
        if !window_seconds.is_finite() || window_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "WINDOW_SECONDS must be positive".to_string(),
            ));
        }

        let max_rate = match var("MAX_RATE") {
            None => defaults.cleaner.max_rate,
            Some(v) if matches!(v.trim().to_lowercase().as_str(), "none" | "off") => None,
            Some(v) => {
                let rate: f64 = v
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(format!("MAX_RATE: {}", v)))?;
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(ConfigError::InvalidValue(format!(
                        "MAX_RATE must be a positive number: {}",
                        v
                    )));
                }
                Some(rate)
            }
        };

        Ok(Self {
            port: var("CTG_PORT")
                .unwrap_or_else(|| "9000".to_string())
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            bind_addr: var("CTG_BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            database_url: var("DATABASE_URL"),
            classifier_url: var("CLASSIFIER_URL"),
            classifier_threshold: parse_or(&var, "CLASSIFIER_THRESHOLD", DEFAULT_CLASSIFIER_THRESHOLD)?,
            classifier_timeout_secs: parse_or(
                &var,
                "CLASSIFIER_TIMEOUT_SECS",
                DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            )?,
            window_seconds,
            broadcast_interval_ms: parse_or(&var, "BROADCAST_INTERVAL_MS", defaults.broadcast_interval_ms)?,
            persist_interval_secs: parse_or(&var, "PERSIST_INTERVAL_SECS", defaults.persist_interval_secs)?,
            external_flush_secs: parse_or(&var, "EXTERNAL_FLUSH_SECS", defaults.external_flush_secs)?,
            ingest_queue_capacity: parse_or(&var, "INGEST_QUEUE_CAPACITY", defaults.ingest_capacity)?,
            analytics_capacity: parse_or(&var, "ANALYTICS_CAPACITY", defaults.analytics_capacity)?,
            max_rate,
            bpm_port: var("BPM_PORT"),
            uterus_port: var("UTERUS_PORT"),
            baud_rate: parse_or(&var, "BAUD_RATE", DEFAULT_BAUD_RATE)?,
            emulator_command: var("EMULATOR_COMMAND"),
            cors_origins: var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                        "http://localhost:5173".to_string(),
                        "http://127.0.0.1:5173".to_string(),
                    ]
                }),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = PipelineConfig {
            window_seconds: self.window_seconds,
            broadcast_interval_ms: self.broadcast_interval_ms,
            persist_interval_secs: self.persist_interval_secs,
            external_flush_secs: self.external_flush_secs,
            ingest_capacity: self.ingest_queue_capacity,
            analytics_capacity: self.analytics_capacity,
            ..PipelineConfig::default()
        };
        pipeline.cleaner.max_rate = self.max_rate;
        pipeline
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            pipeline: self.pipeline_config(),
            bpm_port: self.bpm_port.clone(),
            uterus_port: self.uterus_port.clone(),
            baud_rate: self.baud_rate,
            emulator_command: self.emulator_command.clone(),
            classifier_threshold: self.classifier_threshold,
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}: {}", key, raw))),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert!(config.database_url.is_none());
        assert_eq!(config.classifier_threshold, 0.5);
        assert_eq!(config.max_rate, Some(80.0));
        assert_eq!(config.baud_rate, 115_200);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.window_seconds, 180.0);
        assert_eq!(pipeline.ingest_capacity, 10_000);
        assert_eq!(pipeline.analytics_capacity, 500);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CTG_PORT", "8100"),
            ("WINDOW_SECONDS", "60"),
            ("MAX_RATE", "none"),
            ("BPM_PORT", "/dev/ttyUSB0"),
            ("CORS_ORIGINS", "*"),
        ])
        .unwrap();
        assert_eq!(config.port, 8100);
        assert_eq!(config.max_rate, None);
        assert!(config.allows_any_origin());

        let settings = config.session_settings();
        assert_eq!(settings.pipeline.window_seconds, 60.0);
        assert_eq!(settings.pipeline.cleaner.max_rate, None);
        assert_eq!(settings.bpm_port.as_deref(), Some("/dev/ttyUSB0"));
        assert!(settings.uterus_port.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(config(&[("CTG_PORT", "abc")]), Err(ConfigError::InvalidPort)));
        assert!(matches!(
            config(&[("PERSIST_INTERVAL_SECS", "soon")]),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            config(&[("WINDOW_SECONDS", "-5")]),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_non_finite_and_negative_rates_rejected() {
        for value in ["NaN", "inf", "-3", "0"] {
            assert!(
                matches!(config(&[("MAX_RATE", value)]), Err(ConfigError::InvalidValue(_))),
                "MAX_RATE={} accepted",
                value
            );
        }
        assert!(matches!(
            config(&[("WINDOW_SECONDS", "NaN")]),
            Err(ConfigError::InvalidValue(_))
        ));
        assert_eq!(config(&[("MAX_RATE", "12.5")]).unwrap().max_rate, Some(12.5));
    }
}
