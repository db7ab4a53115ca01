// Stream resolution
//
// Decides which amplifier stream the session connects to: the configured one
// when name and serial are both given, otherwise the result of a discovery
// scan, handed to the operator interface when more than one candidate remains.

use super::{StreamBackend, StreamDescriptor, StreamInfo};
use crate::error::{NfbError, Result};
use crate::gate::{ControlGate, GateState};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Re-scan policy for discovery that finds nothing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total scans, including the first
    pub attempts: u32,
    pub delay: Duration,
}

/// Locator side of the candidate-selection channel
#[derive(Clone)]
pub struct OperatorLink {
    candidates: Sender<Vec<StreamInfo>>,
    selections: Receiver<usize>,
}

/// Operator side of the candidate-selection channel
#[derive(Clone)]
pub struct OperatorPanel {
    candidates: Receiver<Vec<StreamInfo>>,
    selections: Sender<usize>,
}

impl OperatorPanel {
    /// Block until the locator presents candidates; `None` once it is gone
    pub fn recv_candidates(&self) -> Option<Vec<StreamInfo>> {
        self.candidates.recv().ok()
    }

    pub fn recv_candidates_timeout(&self, timeout: Duration) -> Option<Vec<StreamInfo>> {
        self.candidates.recv_timeout(timeout).ok()
    }

    /// Answer with the index of the chosen candidate
    pub fn select(&self, index: usize) -> bool {
        self.selections.send(index).is_ok()
    }
}

/// Create a connected link/panel pair
pub fn operator_channel() -> (OperatorLink, OperatorPanel) {
    let (candidates_tx, candidates_rx) = channel::unbounded();
    let (selections_tx, selections_rx) = channel::unbounded();

    (
        OperatorLink {
            candidates: candidates_tx,
            selections: selections_rx,
        },
        OperatorPanel {
            candidates: candidates_rx,
            selections: selections_tx,
        },
    )
}

pub struct StreamLocator<'a, B: StreamBackend + ?Sized> {
    backend: &'a B,
    operator: Option<OperatorLink>,
    retry: Option<RetryPolicy>,
    discovery_timeout: Duration,
    poll_interval: Duration,
}

impl<'a, B: StreamBackend + ?Sized> StreamLocator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            operator: None,
            retry: None,
            discovery_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_operator(mut self, operator: OperatorLink) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resolve the stream to connect to.
    ///
    /// A fully configured descriptor is returned as is, without scanning.
    pub fn resolve(&self, configured: &StreamDescriptor, gate: &ControlGate) -> Result<StreamDescriptor> {
        if configured.is_complete() {
            log::info!("Using configured stream {}", configured);
            return Ok(configured.clone());
        }

        let candidates = self.scan(configured, gate)?;
        let chosen = if candidates.len() == 1 {
            log::info!(
                "Found a single stream, selecting '{}' (serial {})",
                candidates[0].name,
                candidates[0].serial
            );
            candidates[0].clone()
        } else {
            self.ask_operator(&candidates, gate)?
        };

        Ok(StreamDescriptor::from(&chosen))
    }

    /// Discover non-marker streams matching the partially configured identity
    fn scan(&self, configured: &StreamDescriptor, gate: &ControlGate) -> Result<Vec<StreamInfo>> {
        let attempts = self.retry.map_or(1, |r| r.attempts.max(1));

        for attempt in 1..=attempts {
            if gate.read() == GateState::Stop {
                return Err(NfbError::Aborted("stopped during stream discovery".to_string()));
            }

            log::info!("Looking for streams (attempt {}/{})", attempt, attempts);
            let found: Vec<StreamInfo> = self
                .backend
                .discover(self.discovery_timeout)?
                .into_iter()
                .filter(|info| !info.is_marker_stream())
                .filter(|info| configured.matches(info))
                .collect();

            if !found.is_empty() {
                for (index, info) in found.iter().enumerate() {
                    log::info!(
                        "  [{}] {} ({}) serial={} {} ch @ {} Hz on {}",
                        index,
                        info.name,
                        info.stream_type,
                        info.serial,
                        info.channel_count,
                        info.sample_rate,
                        info.hostname
                    );
                }
                return Ok(found);
            }

            if let Some(retry) = self.retry.filter(|_| attempt < attempts) {
                log::warn!(
                    "No stream found, retrying in {:.1}s",
                    retry.delay.as_secs_f64()
                );
                if gate.sleep_unless_stopped(retry.delay) == GateState::Stop {
                    return Err(NfbError::Aborted("stopped during stream discovery".to_string()));
                }
            }
        }

        let detail = if configured.is_empty() {
            "no signal streams available".to_string()
        } else {
            format!("no signal stream matches {}", configured)
        };
        log::error!("Stream discovery failed: {}", detail);
        Err(NfbError::NoStreamFound(detail))
    }

    fn ask_operator(&self, candidates: &[StreamInfo], gate: &ControlGate) -> Result<StreamInfo> {
        let link = self.operator.as_ref().ok_or_else(|| {
            NfbError::NoStreamFound(format!(
                "{} streams found and no operator interface to choose one",
                candidates.len()
            ))
        })?;

        link.candidates
            .send(candidates.to_vec())
            .map_err(|_| NfbError::Aborted("operator interface disconnected".to_string()))?;
        log::info!("Waiting for the operator to select one of {} streams", candidates.len());

        loop {
            match link.selections.recv_timeout(self.poll_interval) {
                Ok(index) if index < candidates.len() => {
                    let chosen = candidates[index].clone();
                    log::info!("Operator selected '{}' (serial {})", chosen.name, chosen.serial);
                    return Ok(chosen);
                }
                Ok(index) => {
                    log::warn!(
                        "Ignoring stream selection {} ({} candidates)",
                        index,
                        candidates.len()
                    );
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NfbError::Aborted("operator interface disconnected".to_string()));
                }
            }

            if gate.read() == GateState::Stop {
                return Err(NfbError::Aborted("stopped during stream selection".to_string()));
            }
        }
    }
}
