// Simulated amplifier streams
//
// Generates samples in real time against a monotonic clock, so windows,
// timestamps and pacing behave as they would with a live amplifier. Channel 0
// of every regular stream is a TRIGGER channel pulsing once per second; the
// remaining channels carry sinusoids in the alpha/theta range.

use super::{SampleChunk, SampleInlet, StreamBackend, StreamInfo};
use crate::error::{NfbError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

/// One simulated stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedStreamConfig {
    pub name: String,
    #[serde(default = "default_stream_type")]
    pub stream_type: String,
    pub serial: String,
    /// Channel count including the trigger channel
    pub channel_count: usize,
    /// Hz; 0 marks an irregular (marker) stream that never produces samples
    pub sample_rate: f64,
    /// Signal amplitude in microvolts
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
}

fn default_stream_type() -> String {
    "EEG".to_string()
}

fn default_amplitude() -> f64 {
    20.0
}

pub(crate) fn default_streams() -> Vec<SimulatedStreamConfig> {
    vec![
        SimulatedStreamConfig {
            name: "SimulatedEEG".to_string(),
            stream_type: default_stream_type(),
            serial: "SIM-0001".to_string(),
            channel_count: 9,
            sample_rate: 512.0,
            amplitude: default_amplitude(),
        },
        SimulatedStreamConfig {
            name: "SimulatedMarkers".to_string(),
            stream_type: "Markers".to_string(),
            serial: "SIM-MRK".to_string(),
            channel_count: 1,
            sample_rate: 0.0,
            amplitude: 0.0,
        },
    ]
}

pub struct SimulatedBackend {
    streams: Vec<SimulatedStreamConfig>,
    /// Timestamp origin shared by every inlet of this backend
    epoch: Instant,
}

impl SimulatedBackend {
    pub fn new(streams: Vec<SimulatedStreamConfig>) -> Self {
        Self {
            streams,
            epoch: Instant::now(),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(default_streams())
    }
}

impl StreamBackend for SimulatedBackend {
    fn discover(&self, _timeout: Duration) -> Result<Vec<StreamInfo>> {
        Ok(self
            .streams
            .iter()
            .map(|stream| StreamInfo {
                name: stream.name.clone(),
                stream_type: stream.stream_type.clone(),
                serial: stream.serial.clone(),
                channel_count: stream.channel_count,
                sample_rate: stream.sample_rate,
                hostname: "simulated".to_string(),
            })
            .collect())
    }

    fn open(&self, info: &StreamInfo, max_buffer_seconds: f64) -> Result<Box<dyn SampleInlet>> {
        let stream = self
            .streams
            .iter()
            .find(|s| s.name == info.name && s.serial == info.serial)
            .ok_or_else(|| NfbError::Connection(format!("Unknown simulated stream '{}'", info.name)))?;

        if stream.channel_count == 0 {
            return Err(NfbError::Connection(format!(
                "Simulated stream '{}' has no channels",
                stream.name
            )));
        }

        let max_chunk = if stream.sample_rate > 0.0 {
            ((max_buffer_seconds * stream.sample_rate).ceil() as usize).max(1)
        } else {
            0
        };

        log::debug!("Opening simulated stream '{}'", stream.name);

        Ok(Box::new(SimulatedInlet {
            config: stream.clone(),
            epoch: self.epoch,
            opened_at: Instant::now(),
            next_sample: 0,
            max_chunk,
        }))
    }
}

struct SimulatedInlet {
    config: SimulatedStreamConfig,
    epoch: Instant,
    opened_at: Instant,
    next_sample: u64,
    max_chunk: usize,
}

impl SimulatedInlet {
    /// Samples whose acquisition time has passed
    fn due_samples(&self) -> u64 {
        (self.opened_at.elapsed().as_secs_f64() * self.config.sample_rate).floor() as u64
    }

    fn timestamp(&self, index: u64) -> f64 {
        let offset = self.opened_at.duration_since(self.epoch).as_secs_f64();
        offset + index as f64 / self.config.sample_rate
    }

    fn sample(&self, index: u64) -> Vec<f32> {
        let rate = self.config.sample_rate;
        let t = index as f64 / rate;
        let trigger = if index % rate.round().max(1.0) as u64 == 0 { 1.0 } else { 0.0 };

        std::iter::once(trigger)
            .chain((1..self.config.channel_count).map(|ch| {
                let freq = 4.0 + ch as f64;
                (self.config.amplitude * (2.0 * PI * freq * t).sin()) as f32
            }))
            .collect()
    }
}

impl SampleInlet for SimulatedInlet {
    fn channel_labels(&self) -> Vec<String> {
        std::iter::once("TRIGGER".to_string())
            .chain((1..self.config.channel_count).map(|ch| format!("Ch{}", ch)))
            .collect()
    }

    fn pull_chunk(&mut self, timeout: Duration) -> Result<SampleChunk> {
        if self.config.sample_rate <= 0.0 {
            thread::sleep(timeout);
            return Ok(SampleChunk::default());
        }

        let deadline = Instant::now() + timeout;
        let mut due = self.due_samples();
        while due <= self.next_sample {
            let next_at = self.opened_at
                + Duration::from_secs_f64((self.next_sample + 1) as f64 / self.config.sample_rate);
            let now = Instant::now();
            if now >= deadline {
                return Ok(SampleChunk::default());
            }
            thread::sleep(next_at.min(deadline).saturating_duration_since(now));
            due = self.due_samples();
        }

        // Drop samples older than the caller's buffer can hold
        if (due - self.next_sample) as usize > self.max_chunk {
            self.next_sample = due - self.max_chunk as u64;
        }

        let chunk = SampleChunk {
            samples: (self.next_sample..due).map(|i| self.sample(i)).collect(),
            timestamps: (self.next_sample..due).map(|i| self.timestamp(i)).collect(),
        };
        self.next_sample = due;

        Ok(chunk)
    }
}
