#![allow(dead_code)]

use ndarray::Array2;
use nfb_rs::stream::SampleChunk;
use nfb_rs::stream::SampleInlet;
use nfb_rs::{ControlGate, GateState, NfbError, Result, StreamBackend, StreamInfo, Window, WindowSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Window source replaying a script of windows (`None` = no new data).
/// When the script runs out it writes `Stop` to the gate.
pub struct ScriptedSource {
    windows: VecDeque<Option<Vec<f64>>>,
    gate: ControlGate,
}

impl ScriptedSource {
    pub fn new(gate: &ControlGate, script: Vec<Option<Vec<f64>>>) -> Self {
        Self {
            windows: script.into(),
            gate: gate.clone(),
        }
    }
}

impl WindowSource for ScriptedSource {
    fn sample_rate(&self) -> f64 {
        250.0
    }

    fn trigger_channel_index(&self) -> Option<usize> {
        Some(0)
    }

    fn acquire_and_get_window(&mut self) -> Result<Window> {
        match self.windows.pop_front() {
            Some(Some(timestamps)) => {
                let data = Array2::zeros((3, timestamps.len()));
                Ok(Window::new(data, timestamps).expect("scripted window shape"))
            }
            Some(None) => Err(NfbError::NoNewData(0.0)),
            None => {
                self.gate.write(GateState::Stop);
                Err(NfbError::NoNewData(0.0))
            }
        }
    }
}

/// Window source whose every window is newer than the last
pub struct FreshSource {
    next: f64,
}

impl FreshSource {
    pub fn new() -> Self {
        Self { next: 0.0 }
    }
}

impl WindowSource for FreshSource {
    fn sample_rate(&self) -> f64 {
        250.0
    }

    fn trigger_channel_index(&self) -> Option<usize> {
        None
    }

    fn acquire_and_get_window(&mut self) -> Result<Window> {
        let timestamps: Vec<f64> = (0..4).map(|i| self.next + i as f64 * 0.004).collect();
        self.next += 0.016;
        Ok(Window::new(Array2::zeros((2, 4)), timestamps).expect("fresh window shape"))
    }
}

/// Backend exposing one amplifier whose inlet delivers a new sample per pull
pub struct FakeBackend {
    pub scans: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            scans: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn info() -> StreamInfo {
        StreamInfo {
            name: "FakeAmp".to_string(),
            stream_type: "EEG".to_string(),
            serial: "FAKE-1".to_string(),
            channel_count: 3,
            sample_rate: 100.0,
            hostname: "localhost".to_string(),
        }
    }
}

impl StreamBackend for FakeBackend {
    fn discover(&self, _timeout: Duration) -> Result<Vec<StreamInfo>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Self::info()])
    }

    fn open(&self, _info: &StreamInfo, _max_buffer_seconds: f64) -> Result<Box<dyn SampleInlet>> {
        Ok(Box::new(FakeInlet { next: 0 }))
    }
}

struct FakeInlet {
    next: u64,
}

impl SampleInlet for FakeInlet {
    fn channel_labels(&self) -> Vec<String> {
        vec!["TRIGGER".into(), "C3".into(), "C4".into()]
    }

    fn pull_chunk(&mut self, _timeout: Duration) -> Result<SampleChunk> {
        let ts = self.next as f64 * 0.01;
        self.next += 1;
        Ok(SampleChunk {
            samples: vec![vec![0.0, 1.0, -1.0]],
            timestamps: vec![ts],
        })
    }
}
