// Bounded-buffer connection to a single stream
//
// Keeps the last `buffer_size` seconds of samples in a ring buffer and serves
// the newest `window_size` seconds of it as a [channels x samples] window.

use super::{SampleInlet, StreamBackend, StreamDescriptor, StreamInfo, Window, WindowSource};
use crate::error::{NfbError, Result};
use ndarray::Array2;
use std::collections::VecDeque;
use std::time::Duration;

/// How long a single acquire waits for new samples before reporting underrun
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_millis(500);

const TRIGGER_LABELS: [&str; 2] = ["TRIGGER", "TRG"];

/// Upper bound on buffered samples per stream
pub const MAX_BUFFER_SAMPLES: usize = 1 << 26;

pub struct StreamReceiver {
    info: StreamInfo,
    inlet: Box<dyn SampleInlet>,
    channel_labels: Vec<String>,
    trigger_channel: Option<usize>,
    window_samples: usize,
    buffer_samples: usize,
    samples: VecDeque<Vec<f32>>,
    timestamps: VecDeque<f64>,
    pull_timeout: Duration,
}

impl StreamReceiver {
    /// Resolve `descriptor` against the live streams and open a connection.
    ///
    /// `window_size` and `buffer_size` are in seconds.
    pub fn connect<B: StreamBackend + ?Sized>(
        backend: &B,
        descriptor: &StreamDescriptor,
        window_size: f64,
        buffer_size: f64,
        discovery_timeout: Duration,
    ) -> Result<Self> {
        log::info!("Connecting to stream {}", descriptor);

        let streams = backend.discover(discovery_timeout)?;
        let info = streams
            .into_iter()
            .find(|info| descriptor.matches(info))
            .ok_or_else(|| {
                NfbError::Connection(format!("Stream {} is not available", descriptor))
            })?;

        if info.sample_rate <= 0.0 {
            return Err(NfbError::Connection(format!(
                "Stream '{}' has an irregular sampling rate and cannot be windowed",
                info.name
            )));
        }

        let inlet = backend.open(&info, buffer_size)?;
        Self::from_inlet(info, inlet, window_size, buffer_size)
    }

    /// Wrap an already opened inlet
    pub fn from_inlet(
        info: StreamInfo,
        inlet: Box<dyn SampleInlet>,
        window_size: f64,
        buffer_size: f64,
    ) -> Result<Self> {
        if window_size <= 0.0 || buffer_size <= 0.0 {
            return Err(NfbError::Configuration(format!(
                "Window size ({}) and buffer size ({}) must be positive",
                window_size, buffer_size
            )));
        }

        let window_samples = samples_for(window_size, info.sample_rate, "Window")?.max(1);
        let buffer_samples = samples_for(buffer_size, info.sample_rate, "Buffer")?.max(window_samples);

        let mut channel_labels = inlet.channel_labels();
        if channel_labels.len() != info.channel_count {
            channel_labels = (0..info.channel_count).map(|i| format!("Ch{}", i + 1)).collect();
        }
        let trigger_channel = find_trigger_channel(&channel_labels);

        log::info!(
            "Connected to '{}' (serial {}): {} channels @ {} Hz, window {} samples, buffer {} samples",
            info.name,
            info.serial,
            info.channel_count,
            info.sample_rate,
            window_samples,
            buffer_samples
        );
        match trigger_channel {
            Some(index) => log::info!("Trigger channel: {} ({})", index, channel_labels[index]),
            None => log::warn!("No trigger channel found on '{}'", info.name),
        }

        Ok(Self {
            info,
            inlet,
            channel_labels,
            trigger_channel,
            window_samples,
            buffer_samples,
            samples: VecDeque::new(),
            timestamps: VecDeque::new(),
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        })
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn channel_labels(&self) -> &[String] {
        &self.channel_labels
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    pub fn buffered_samples(&self) -> usize {
        self.timestamps.len()
    }

    /// Pull one chunk into the ring buffer; returns the number of new samples
    fn acquire(&mut self) -> Result<usize> {
        let chunk = self.inlet.pull_chunk(self.pull_timeout)?;
        if chunk.samples.len() != chunk.timestamps.len() {
            return Err(NfbError::Connection(format!(
                "Chunk has {} samples but {} timestamps",
                chunk.samples.len(),
                chunk.timestamps.len()
            )));
        }
        if let Some(sample) = chunk
            .samples
            .iter()
            .find(|sample| sample.len() != self.info.channel_count)
        {
            return Err(NfbError::Connection(format!(
                "Expected {} channels per sample, got {}",
                self.info.channel_count,
                sample.len()
            )));
        }

        let received = chunk.len();
        self.samples.extend(chunk.samples);
        self.timestamps.extend(chunk.timestamps);

        while self.timestamps.len() > self.buffer_samples {
            self.samples.pop_front();
            self.timestamps.pop_front();
        }

        Ok(received)
    }

    /// Newest `window_samples` of the buffer, transposed to [channels x samples]
    fn current_window(&self) -> Window {
        let len = self.window_samples.min(self.timestamps.len());
        let start = self.timestamps.len() - len;

        let data = Array2::from_shape_fn((self.info.channel_count, len), |(ch, s)| {
            self.samples[start + s][ch]
        });
        let timestamps = self.timestamps.range(start..).copied().collect();

        Window::from_parts(data, timestamps)
    }
}

impl WindowSource for StreamReceiver {
    fn sample_rate(&self) -> f64 {
        self.info.sample_rate
    }

    fn trigger_channel_index(&self) -> Option<usize> {
        self.trigger_channel
    }

    fn acquire_and_get_window(&mut self) -> Result<Window> {
        let received = self.acquire()?;
        if received == 0 || self.timestamps.is_empty() {
            return Err(NfbError::NoNewData(self.pull_timeout.as_secs_f64()));
        }
        Ok(self.current_window())
    }
}

/// `seconds` at `rate` as a sample count, bounded by [`MAX_BUFFER_SAMPLES`]
fn samples_for(seconds: f64, rate: f64, what: &str) -> Result<usize> {
    let samples = (seconds * rate).round();
    if !samples.is_finite() || samples > MAX_BUFFER_SAMPLES as f64 {
        return Err(NfbError::Configuration(format!(
            "{} of {}s at {} Hz exceeds {} samples",
            what, seconds, rate, MAX_BUFFER_SAMPLES
        )));
    }
    Ok(samples as usize)
}

fn find_trigger_channel(labels: &[String]) -> Option<usize> {
    labels.iter().position(|label| {
        let label = label.trim().to_ascii_uppercase();
        TRIGGER_LABELS.contains(&label.as_str()) || label.starts_with("STI")
    })
}
