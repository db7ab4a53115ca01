// Stream discovery and acquisition
//
// `StreamBackend` and `SampleInlet` are the seam to the external streaming
// API. Everything above them (locator, receiver, acquisition loop) only sees
// `StreamInfo` candidates and `SampleChunk`s. New backends are added by:
// 1. Implementing StreamBackend / SampleInlet
// 2. Adding a variant to SourceConfig
// 3. Registering it in `create_backend`
//
// Current implementations:
// - Simulated: real-time synthetic EEG with a trigger channel
// - LSL: Lab Streaming Layer (feature `lsl-support`)

mod locator;
#[cfg(feature = "lsl-support")]
mod lsl;
mod receiver;
mod simulated;
mod window;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use locator::{operator_channel, OperatorLink, OperatorPanel, RetryPolicy, StreamLocator};
#[cfg(feature = "lsl-support")]
pub use lsl::LslBackend;
pub use receiver::{StreamReceiver, DEFAULT_PULL_TIMEOUT};
pub use simulated::{SimulatedBackend, SimulatedStreamConfig};
pub use window::{Window, WindowSource};

/// Identity of the amplifier stream to connect to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: Option<String>,
    pub serial: Option<String>,
}

impl StreamDescriptor {
    pub fn new(name: Option<String>, serial: Option<String>) -> Self {
        Self { name, serial }
    }

    /// Both name and serial are known
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.serial.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.serial.is_none()
    }

    /// Unset fields match anything
    pub fn matches(&self, info: &StreamInfo) -> bool {
        let name_ok = self.name.as_deref().map_or(true, |name| name == info.name);
        let serial_ok = self
            .serial
            .as_deref()
            .map_or(true, |serial| serial == info.serial);
        name_ok && serial_ok
    }
}

impl From<&StreamInfo> for StreamDescriptor {
    fn from(info: &StreamInfo) -> Self {
        Self {
            name: Some(info.name.clone()),
            serial: Some(info.serial.clone()),
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (serial {})",
            self.name.as_deref().unwrap_or("<any>"),
            self.serial.as_deref().unwrap_or("<any>")
        )
    }
}

/// A stream seen during discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub stream_type: String,
    /// Amplifier serial number (LSL source id)
    pub serial: String,
    pub channel_count: usize,
    /// Nominal rate in Hz, 0 for irregular streams
    pub sample_rate: f64,
    pub hostname: String,
}

impl StreamInfo {
    /// Event-only streams carry no continuous signal to window
    pub fn is_marker_stream(&self) -> bool {
        self.stream_type.to_ascii_lowercase().contains("marker")
    }
}

/// Samples pulled from an inlet. `samples[i]` holds one value per channel
/// for the sample stamped `timestamps[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleChunk {
    pub samples: Vec<Vec<f32>>,
    pub timestamps: Vec<f64>,
}

impl SampleChunk {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Discovery and inlet creation for one streaming technology
pub trait StreamBackend: Send {
    /// Scan for streams currently visible, waiting at most `timeout`
    fn discover(&self, timeout: Duration) -> Result<Vec<StreamInfo>>;

    /// Open an inlet on a discovered stream
    fn open(&self, info: &StreamInfo, max_buffer_seconds: f64) -> Result<Box<dyn SampleInlet>>;
}

impl<B: StreamBackend + ?Sized> StreamBackend for Box<B> {
    fn discover(&self, timeout: Duration) -> Result<Vec<StreamInfo>> {
        (**self).discover(timeout)
    }

    fn open(&self, info: &StreamInfo, max_buffer_seconds: f64) -> Result<Box<dyn SampleInlet>> {
        (**self).open(info, max_buffer_seconds)
    }
}

/// An open connection on a single stream
pub trait SampleInlet: Send {
    /// Channel labels in stream order
    fn channel_labels(&self) -> Vec<String>;

    /// Pull whatever arrived since the last call, blocking at most `timeout`.
    /// An empty chunk means nothing arrived in time.
    fn pull_chunk(&mut self, timeout: Duration) -> Result<SampleChunk>;
}

/// Which streaming technology feeds the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    /// Synthetic real-time streams, for dry runs and tests
    #[serde(rename = "simulated")]
    Simulated {
        #[serde(default = "simulated::default_streams")]
        streams: Vec<SimulatedStreamConfig>,
    },

    /// Lab Streaming Layer
    #[cfg(feature = "lsl-support")]
    #[serde(rename = "lsl")]
    Lsl {
        /// Maximum samples per pulled chunk (0 lets the sender decide)
        #[serde(default)]
        max_chunk_len: Option<usize>,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Simulated {
            streams: simulated::default_streams(),
        }
    }
}

/// Build the backend described by `config`
pub fn create_backend(config: &SourceConfig) -> Box<dyn StreamBackend> {
    match config {
        SourceConfig::Simulated { streams } => Box::new(SimulatedBackend::new(streams.clone())),

        #[cfg(feature = "lsl-support")]
        SourceConfig::Lsl { max_chunk_len } => Box::new(LslBackend::new(*max_chunk_len)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, serial: &str, stream_type: &str) -> StreamInfo {
        StreamInfo {
            name: name.to_string(),
            stream_type: stream_type.to_string(),
            serial: serial.to_string(),
            channel_count: 4,
            sample_rate: 256.0,
            hostname: "localhost".to_string(),
        }
    }

    #[test]
    fn test_descriptor_matching() {
        let eeg = info("Amp", "A-1", "EEG");

        assert!(StreamDescriptor::default().matches(&eeg));
        assert!(StreamDescriptor::new(Some("Amp".into()), None).matches(&eeg));
        assert!(StreamDescriptor::new(None, Some("A-1".into())).matches(&eeg));
        assert!(!StreamDescriptor::new(Some("Amp".into()), Some("B-2".into())).matches(&eeg));
    }

    #[test]
    fn test_descriptor_from_info() {
        let descriptor = StreamDescriptor::from(&info("Amp", "A-1", "EEG"));
        assert!(descriptor.is_complete());
        assert_eq!(descriptor.to_string(), "Amp (serial A-1)");
    }

    #[test]
    fn test_marker_detection() {
        assert!(info("Events", "M", "Markers").is_marker_stream());
        assert!(info("Events", "M", "marker").is_marker_stream());
        assert!(!info("Amp", "A", "EEG").is_marker_stream());
    }

    #[test]
    fn test_source_config_json() {
        let config: SourceConfig = serde_json::from_str(r#"{"type": "simulated"}"#).unwrap();
        assert_eq!(config, SourceConfig::default());
    }
}
