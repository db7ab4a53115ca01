// Session configuration
//
// Configuration files (JSON or YAML) deserialize into `RawSessionConfig`,
// where every field is optional. `validate` turns that into the immutable
// `SessionConfig`: missing required fields are fatal, every other missing
// field is defaulted with a warning.

use crate::error::{NfbError, Result};
use crate::stream::{SourceConfig, StreamDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_GLOBAL_TIME_SECONDS: f64 = 60.0;
pub const DEFAULT_PARALLEL_JOBS: usize = 1;
pub const DEFAULT_NO_DATA_BACKOFF_SECONDS: f64 = 1.0;
pub const DEFAULT_DISCOVERY_TIMEOUT_SECONDS: f64 = 1.0;
pub const DEFAULT_GATE_POLL_SECONDS: f64 = 0.05;

/// Configuration as read from disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSessionConfig {
    #[serde(default, alias = "DATA_PATH")]
    pub data_path: Option<PathBuf>,
    #[serde(default, alias = "AMP_NAME")]
    pub amp_name: Option<String>,
    #[serde(default, alias = "AMP_SERIAL")]
    pub amp_serial: Option<String>,
    #[serde(default, alias = "GLOBAL_TIME")]
    pub global_time_seconds: Option<f64>,
    #[serde(default, alias = "NJOBS")]
    pub parallel_jobs: Option<usize>,
    #[serde(default, alias = "WINDOWSIZE")]
    pub window_size_seconds: Option<f64>,
    #[serde(default, alias = "STREAMBUFFER")]
    pub buffer_size_seconds: Option<f64>,
    #[serde(default, alias = "TIMER_SLEEP")]
    pub timer_sleep_seconds: Option<f64>,
    #[serde(default)]
    pub no_data_backoff_seconds: Option<f64>,
    #[serde(default)]
    pub discovery_timeout_seconds: Option<f64>,
    #[serde(default)]
    pub gate_poll_seconds: Option<f64>,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    /// Everything else, left for the window processor
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Validated, immutable session configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub data_path: PathBuf,
    pub amp_name: Option<String>,
    pub amp_serial: Option<String>,
    pub global_time_seconds: f64,
    pub parallel_jobs: usize,
    pub window_size_seconds: f64,
    pub buffer_size_seconds: f64,
    pub timer_sleep_seconds: f64,
    pub no_data_backoff_seconds: f64,
    pub discovery_timeout_seconds: f64,
    pub gate_poll_seconds: f64,
    pub source: SourceConfig,
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| {
        log::error!("{} is a required parameter", key);
        NfbError::Configuration(format!("{} is a required parameter", key))
    })
}

fn defaulted<T: Debug>(value: Option<T>, key: &str, default: T) -> T {
    value.unwrap_or_else(|| {
        log::warn!("Setting undefined parameter {}={:?}", key, default);
        default
    })
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        let message = message();
        log::error!("{}", message);
        Err(NfbError::Configuration(message))
    }
}

/// Saturating conversion; `check_values` rejects out-of-range values first
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

impl RawSessionConfig {
    pub fn validate(self) -> Result<SessionConfig> {
        let data_path = required(self.data_path, "data_path")?;
        let window_size_seconds = required(self.window_size_seconds, "window_size_seconds")?;
        let buffer_size_seconds = required(self.buffer_size_seconds, "buffer_size_seconds")?;
        let timer_sleep_seconds = required(self.timer_sleep_seconds, "timer_sleep_seconds")?;

        let config = SessionConfig {
            data_path,
            amp_name: defaulted(self.amp_name.map(Some), "amp_name", None),
            amp_serial: defaulted(self.amp_serial.map(Some), "amp_serial", None),
            global_time_seconds: defaulted(
                self.global_time_seconds,
                "global_time_seconds",
                DEFAULT_GLOBAL_TIME_SECONDS,
            ),
            parallel_jobs: defaulted(self.parallel_jobs, "parallel_jobs", DEFAULT_PARALLEL_JOBS),
            window_size_seconds,
            buffer_size_seconds,
            timer_sleep_seconds,
            no_data_backoff_seconds: defaulted(
                self.no_data_backoff_seconds,
                "no_data_backoff_seconds",
                DEFAULT_NO_DATA_BACKOFF_SECONDS,
            ),
            discovery_timeout_seconds: defaulted(
                self.discovery_timeout_seconds,
                "discovery_timeout_seconds",
                DEFAULT_DISCOVERY_TIMEOUT_SECONDS,
            ),
            gate_poll_seconds: defaulted(
                self.gate_poll_seconds,
                "gate_poll_seconds",
                DEFAULT_GATE_POLL_SECONDS,
            ),
            source: defaulted(self.source, "source", SourceConfig::default()),
            extra: self.extra,
        };

        config.check_values()?;
        Ok(config)
    }
}

impl SessionConfig {
    /// Load and validate a JSON (`.json`) or YAML (`.yaml`, `.yml`) file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            NfbError::Configuration(format!("Cannot read '{}': {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match extension.as_str() {
            "json" => Self::from_json_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            other => Err(NfbError::Configuration(format!(
                "Unsupported configuration format '{}'. Supported: json, yaml, yml",
                other
            ))),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawSessionConfig =
            serde_json::from_str(content).map_err(|e| NfbError::Parse(e.to_string()))?;
        raw.validate()
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: RawSessionConfig =
            serde_yaml::from_str(content).map_err(|e| NfbError::Parse(e.to_string()))?;
        raw.validate()
    }

    fn check_values(&self) -> Result<()> {
        check(!self.data_path.as_os_str().is_empty(), || {
            "data_path must not be empty".to_string()
        })?;
        check(
            self.window_size_seconds.is_finite() && self.window_size_seconds > 0.0,
            || format!("window_size_seconds must be positive, got {}", self.window_size_seconds),
        )?;
        check(
            self.buffer_size_seconds.is_finite()
                && self.buffer_size_seconds >= self.window_size_seconds,
            || {
                format!(
                    "buffer_size_seconds ({}) must be at least window_size_seconds ({})",
                    self.buffer_size_seconds, self.window_size_seconds
                )
            },
        )?;

        let non_negative = [
            ("timer_sleep_seconds", self.timer_sleep_seconds),
            ("global_time_seconds", self.global_time_seconds),
            ("no_data_backoff_seconds", self.no_data_backoff_seconds),
        ];
        for (key, value) in non_negative {
            check(Duration::try_from_secs_f64(value).is_ok(), || {
                format!("{} must be a non-negative number of seconds, got {}", key, value)
            })?;
        }

        let positive = [
            ("discovery_timeout_seconds", self.discovery_timeout_seconds),
            ("gate_poll_seconds", self.gate_poll_seconds),
        ];
        for (key, value) in positive {
            check(value > 0.0 && Duration::try_from_secs_f64(value).is_ok(), || {
                format!("{} must be a positive number of seconds, got {}", key, value)
            })?;
        }

        check(self.parallel_jobs >= 1, || {
            "parallel_jobs must be at least 1".to_string()
        })
    }

    pub fn stream_descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(self.amp_name.clone(), self.amp_serial.clone())
    }

    pub fn min_interval(&self) -> Duration {
        seconds(self.timer_sleep_seconds)
    }

    pub fn deadline(&self) -> Duration {
        seconds(self.global_time_seconds)
    }

    pub fn no_data_backoff(&self) -> Duration {
        seconds(self.no_data_backoff_seconds)
    }

    pub fn discovery_timeout(&self) -> Duration {
        seconds(self.discovery_timeout_seconds)
    }

    pub fn gate_poll_interval(&self) -> Duration {
        seconds(self.gate_poll_seconds)
    }

    /// Thread pool sized by `parallel_jobs`, for window processors
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_jobs)
            .thread_name(|i| format!("nfb-worker-{}", i))
            .build()
            .map_err(|e| NfbError::Configuration(format!("Cannot build thread pool: {}", e)))
    }

    /// Create `data_path` if needed
    pub fn ensure_data_path(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(&self.data_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "data_path": "/tmp/nfb",
        "window_size_seconds": 2.0,
        "buffer_size_seconds": 10.0,
        "timer_sleep_seconds": 0.1
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = SessionConfig::from_json_str(MINIMAL).unwrap();

        assert_eq!(config.data_path, PathBuf::from("/tmp/nfb"));
        assert_eq!(config.amp_name, None);
        assert_eq!(config.amp_serial, None);
        assert_eq!(config.global_time_seconds, 60.0);
        assert_eq!(config.parallel_jobs, 1);
        assert_eq!(config.no_data_backoff(), Duration::from_secs(1));
        assert_eq!(config.min_interval(), Duration::from_millis(100));
        assert_eq!(config.source, SourceConfig::default());
        assert!(config.stream_descriptor().is_empty());
    }

    #[test]
    fn test_missing_data_path_is_fatal() {
        let result = SessionConfig::from_json_str(
            r#"{"window_size_seconds": 1.0, "buffer_size_seconds": 1.0, "timer_sleep_seconds": 0.1}"#,
        );
        match result {
            Err(NfbError::Configuration(msg)) => assert!(msg.contains("data_path")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_loop_field_is_fatal() {
        let result = SessionConfig::from_json_str(
            r#"{"data_path": "/tmp/nfb", "window_size_seconds": 1.0, "buffer_size_seconds": 1.0}"#,
        );
        assert!(matches!(result, Err(NfbError::Configuration(_))));
    }

    #[test]
    fn test_uppercase_keys_accepted() {
        let config = SessionConfig::from_json_str(
            r#"{
                "DATA_PATH": "/tmp/nfb",
                "AMP_NAME": "Amp",
                "AMP_SERIAL": "A-1",
                "GLOBAL_TIME": 120.0,
                "NJOBS": 4,
                "WINDOWSIZE": 2.0,
                "STREAMBUFFER": 10.0,
                "TIMER_SLEEP": 0.25
            }"#,
        )
        .unwrap();

        assert!(config.stream_descriptor().is_complete());
        assert_eq!(config.global_time_seconds, 120.0);
        assert_eq!(config.parallel_jobs, 4);
    }

    #[test]
    fn test_extra_fields_kept() {
        let config = SessionConfig::from_json_str(
            r#"{
                "data_path": "/tmp/nfb",
                "window_size_seconds": 2.0,
                "buffer_size_seconds": 10.0,
                "timer_sleep_seconds": 0.1,
                "alpha_band": [8, 12]
            }"#,
        )
        .unwrap();

        assert_eq!(config.extra["alpha_band"], serde_json::json!([8, 12]));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let buffer_too_small = r#"{
            "data_path": "/tmp/nfb",
            "window_size_seconds": 2.0,
            "buffer_size_seconds": 1.0,
            "timer_sleep_seconds": 0.1
        }"#;
        assert!(matches!(
            SessionConfig::from_json_str(buffer_too_small),
            Err(NfbError::Configuration(_))
        ));

        let no_jobs = r#"{
            "data_path": "/tmp/nfb",
            "window_size_seconds": 2.0,
            "buffer_size_seconds": 10.0,
            "timer_sleep_seconds": 0.1,
            "parallel_jobs": 0
        }"#;
        assert!(matches!(
            SessionConfig::from_json_str(no_jobs),
            Err(NfbError::Configuration(_))
        ));
    }

    #[test]
    fn test_unrepresentable_durations_rejected() {
        for key in ["global_time_seconds", "timer_sleep_seconds", "gate_poll_seconds"] {
            let mut content = serde_json::json!({
                "data_path": "/tmp/nfb",
                "window_size_seconds": 2.0,
                "buffer_size_seconds": 10.0,
                "timer_sleep_seconds": 0.1
            });
            content[key] = serde_json::json!(1e20);
            match SessionConfig::from_json_str(&content.to_string()) {
                Err(NfbError::Configuration(msg)) => assert!(msg.contains(key)),
                other => panic!("{} = 1e20 should be rejected, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SessionConfig::from_json_str("{ not json"),
            Err(NfbError::Parse(_))
        ));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "data_path: /tmp/nfb\nwindow_size_seconds: 1.0\nbuffer_size_seconds: 4.0\ntimer_sleep_seconds: 0.05\nsource:\n  type: simulated"
        )
        .unwrap();

        let config = SessionConfig::from_path(file.path()).unwrap();
        assert_eq!(config.buffer_size_seconds, 4.0);
        assert_eq!(config.source, SourceConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        assert!(matches!(
            SessionConfig::from_path(file.path()),
            Err(NfbError::Configuration(_))
        ));
    }

    #[test]
    fn test_thread_pool_size() {
        let mut config = SessionConfig::from_json_str(MINIMAL).unwrap();
        config.parallel_jobs = 2;

        let pool = config.thread_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }

    #[test]
    fn test_ensure_data_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SessionConfig::from_json_str(MINIMAL).unwrap();
        config.data_path = dir.path().join("session");

        config.ensure_data_path().unwrap();
        assert!(dir.path().join("session").is_dir());
    }
}
