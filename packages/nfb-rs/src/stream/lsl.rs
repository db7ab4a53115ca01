// Lab Streaming Layer (LSL) backend
//
// Discovers amplifier streams on the local network and pulls multiplexed
// float samples with LSL's synchronized timestamps. LSL calls are blocking,
// which matches the acquisition loop's own thread.

use super::{SampleChunk, SampleInlet, StreamBackend, StreamInfo};
use crate::error::{NfbError, Result};
use lsl::Pullable;
use std::time::Duration;

pub struct LslBackend {
    max_chunk_len: i32,
}

impl LslBackend {
    pub fn new(max_chunk_len: Option<usize>) -> Self {
        Self {
            max_chunk_len: max_chunk_len.unwrap_or(0) as i32,
        }
    }

    fn to_stream_info(info: &lsl::StreamInfo) -> StreamInfo {
        StreamInfo {
            name: info.stream_name(),
            stream_type: info.stream_type(),
            serial: info.source_id(),
            channel_count: info.channel_count().max(0) as usize,
            sample_rate: info.nominal_srate(),
            hostname: info.hostname(),
        }
    }

    /// Channel labels from the stream's XML description
    fn channel_labels(info: &lsl::StreamInfo) -> Vec<String> {
        let mut labels = Vec::new();
        let mut channel = info.desc().child("channels").child("channel");
        while channel.is_valid() {
            labels.push(channel.child_value_named("label"));
            channel = channel.next_sibling_named("channel");
        }
        labels
    }
}

impl StreamBackend for LslBackend {
    fn discover(&self, timeout: Duration) -> Result<Vec<StreamInfo>> {
        let streams = lsl::resolve_streams(timeout.as_secs_f64())
            .map_err(|e| NfbError::Connection(format!("LSL resolve failed: {:?}", e)))?;

        log::debug!("LSL resolver returned {} streams", streams.len());
        Ok(streams.iter().map(Self::to_stream_info).collect())
    }

    fn open(&self, info: &StreamInfo, max_buffer_seconds: f64) -> Result<Box<dyn SampleInlet>> {
        let predicate = format!("name='{}' and source_id='{}'", info.name, info.serial);
        let resolved = lsl::resolve_bypred(&predicate, 1, 2.0)
            .map_err(|e| NfbError::Connection(format!("LSL resolve failed: {:?}", e)))?;
        let stream_info = resolved.into_iter().next().ok_or_else(|| {
            NfbError::Connection(format!("LSL stream '{}' is no longer available", info.name))
        })?;

        let max_buflen = max_buffer_seconds.ceil().max(1.0) as i32;
        let inlet = lsl::StreamInlet::new(&stream_info, max_buflen, self.max_chunk_len, true)
            .map_err(|e| NfbError::Connection(format!("Failed to create LSL inlet: {:?}", e)))?;

        // The full description (with channel labels) is only available from the inlet
        let full_info = inlet
            .info(2.0)
            .map_err(|e| NfbError::Connection(format!("Failed to read LSL stream info: {:?}", e)))?;
        let labels = Self::channel_labels(&full_info);

        log::info!("LSL inlet created for '{}'", info.name);

        Ok(Box::new(LslInlet { inlet, labels }))
    }
}

struct LslInlet {
    inlet: lsl::StreamInlet,
    labels: Vec<String>,
}

impl SampleInlet for LslInlet {
    fn channel_labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn pull_chunk(&mut self, timeout: Duration) -> Result<SampleChunk> {
        // Block for the first sample only, then drain whatever else is queued
        let (first, first_ts): (Vec<f32>, f64) = self
            .inlet
            .pull_sample(timeout.as_secs_f64())
            .map_err(|e| NfbError::Connection(format!("LSL pull failed: {:?}", e)))?;
        if first_ts == 0.0 {
            return Ok(SampleChunk::default());
        }

        let (rest, rest_ts): (Vec<Vec<f32>>, Vec<f64>) = self
            .inlet
            .pull_chunk()
            .map_err(|e| NfbError::Connection(format!("LSL pull failed: {:?}", e)))?;

        let mut chunk = SampleChunk {
            samples: Vec::with_capacity(rest.len() + 1),
            timestamps: Vec::with_capacity(rest_ts.len() + 1),
        };
        chunk.samples.push(first);
        chunk.timestamps.push(first_ts);
        chunk.samples.extend(rest);
        chunk.timestamps.extend(rest_ts);

        Ok(chunk)
    }
}
