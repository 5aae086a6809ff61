use garde::Validate;
use serde::Deserialize;
use std::time::Duration;
use strum::{Display, EnumString};

/// Which recognizer the worker pool runs.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecognizerKind {
    /// Fixed paracetamol result after a short delay.
    Mock,
    /// OCR endpoint plus catalog matching.
    Remote,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_image_bytes")]
    #[garde(range(min = 1, max = 64 * 1024 * 1024))]
    pub max_image_bytes: usize,

    /// Pending jobs allowed before submissions are rejected as overloaded.
    #[serde(default = "default_max_queue_depth")]
    #[garde(range(min = 1))]
    pub max_queue_depth: usize,

    /// Number of identification workers.
    #[serde(default = "default_worker_count")]
    #[garde(range(min = 1, max = 256))]
    pub worker_count: usize,

    /// How long a worker may hold a job before the lease expires. At most one hour.
    #[serde(default = "default_lease_timeout_ms")]
    #[garde(range(min = 1, max = 3_600_000))]
    pub lease_timeout_ms: u64,

    /// Interval of the expired-lease sweep.
    #[serde(default = "default_lease_sweep_ms")]
    #[garde(range(min = 1))]
    pub lease_sweep_ms: u64,

    /// Retries after the first failed attempt.
    #[serde(default = "default_retry_limit")]
    #[garde(range(max = 10))]
    pub retry_limit: u32,

    /// Maximum number of cached identification results.
    #[serde(default = "default_cache_capacity")]
    #[garde(range(min = 1))]
    pub cache_capacity: u64,

    /// Results below this confidence are flagged `low_confidence`.
    #[serde(default = "default_low_confidence_threshold")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub low_confidence_threshold: f64,

    #[serde(default = "default_recognizer")]
    #[garde(skip)]
    pub recognizer: RecognizerKind,

    /// OCR endpoint used by the remote recognizer.
    #[serde(default)]
    #[garde(skip)]
    pub recognizer_url: Option<String>,

    /// Bearer token for the OCR endpoint.
    #[serde(default)]
    #[garde(skip)]
    pub recognizer_token: Option<String>,

    /// Simulated processing time of the mock recognizer.
    #[serde(default = "default_mock_delay_ms")]
    #[garde(skip)]
    pub mock_delay_ms: u64,

    /// JSON file with additional catalog records.
    #[serde(default)]
    #[garde(skip)]
    pub catalog_path: Option<String>,

    /// Fall back to openFDA for medicine ids missing from the catalog.
    #[serde(default)]
    #[garde(skip)]
    pub openfda_enabled: bool,

    #[serde(default)]
    #[garde(skip)]
    pub openfda_api_key: Option<String>,

    /// Override for the openFDA drug label endpoint.
    #[serde(default)]
    #[garde(skip)]
    pub openfda_url: Option<String>,

    /// How long finished scan records are kept.
    #[serde(default = "default_status_retention_secs")]
    #[garde(range(min = 1))]
    pub status_retention_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_queue_depth() -> usize {
    256
}

fn default_worker_count() -> usize {
    4
}

fn default_lease_timeout_ms() -> u64 {
    30_000
}

fn default_lease_sweep_ms() -> u64 {
    250
}

fn default_retry_limit() -> u32 {
    2
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_low_confidence_threshold() -> f64 {
    0.6
}

fn default_recognizer() -> RecognizerKind {
    RecognizerKind::Mock
}

fn default_mock_delay_ms() -> u64 {
    800
}

fn default_status_retention_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_image_bytes: default_max_image_bytes(),
            max_queue_depth: default_max_queue_depth(),
            worker_count: default_worker_count(),
            lease_timeout_ms: default_lease_timeout_ms(),
            lease_sweep_ms: default_lease_sweep_ms(),
            retry_limit: default_retry_limit(),
            cache_capacity: default_cache_capacity(),
            low_confidence_threshold: default_low_confidence_threshold(),
            recognizer: default_recognizer(),
            recognizer_url: None,
            recognizer_token: None,
            mock_delay_ms: default_mock_delay_ms(),
            catalog_path: None,
            openfda_enabled: false,
            openfda_api_key: None,
            openfda_url: None,
            status_retention_secs: default_status_retention_secs(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.check()?;
        Ok(config)
    }

    /// Range checks plus the cross-field rules garde cannot express.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.recognizer == RecognizerKind::Remote && self.recognizer_url.is_none() {
            return Err(ConfigError::Missing("RECOGNIZER_URL"));
        }
        Ok(())
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    pub fn lease_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.lease_sweep_ms)
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }

    pub fn status_retention(&self) -> Duration {
        Duration::from_secs(self.status_retention_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),

    #[error("{0} is required for the selected recognizer")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.retry_limit, 2);
        assert_eq!(config.recognizer, RecognizerKind::Mock);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = AppConfig {
            low_confidence_threshold: 1.5,
            ..AppConfig::default()
        };
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = AppConfig {
            worker_count: 0,
            ..AppConfig::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn test_lease_timeout_is_bounded() {
        let config = AppConfig {
            lease_timeout_ms: u64::MAX,
            ..AppConfig::default()
        };
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

        let config = AppConfig {
            lease_timeout_ms: 3_600_000,
            ..AppConfig::default()
        };
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_remote_requires_url() {
        let config = AppConfig {
            recognizer: RecognizerKind::Remote,
            ..AppConfig::default()
        };
        assert!(matches!(config.check(), Err(ConfigError::Missing("RECOGNIZER_URL"))));
    }

    #[test]
    fn test_from_iter_env() {
        let vars = vec![
            ("WORKER_COUNT".to_string(), "2".to_string()),
            ("RECOGNIZER".to_string(), "remote".to_string()),
            ("RECOGNIZER_URL".to_string(), "http://ocr.local/run".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.recognizer, RecognizerKind::Remote);
        assert_eq!(config.max_queue_depth, 256);
        assert!(config.check().is_ok());
    }
}
