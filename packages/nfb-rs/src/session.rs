// Session orchestration
//
// Mirrors the order of an online protocol run: wait for the operator to arm
// the session, resolve and connect to the amplifier stream, then hand over to
// the acquisition loop until Stop or the deadline.

use crate::acquisition::{AcquisitionLoop, LoopReport, LoopSettings, WindowProcessor};
use crate::config::SessionConfig;
use crate::error::{NfbError, Result};
use crate::gate::ControlGate;
use crate::stream::{OperatorLink, RetryPolicy, StreamBackend, StreamLocator, StreamReceiver};
use serde::Serialize;

/// Exit status of a completed session
pub const EXIT_COMPLETED: i32 = 0;
/// Exit status of a session aborted before acquisition started
pub const EXIT_ABORTED: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Acquisition ran and ended on Stop or deadline
    Completed(LoopReport),
    /// Stopped before acquisition ever started
    Aborted { reason: String },
}

impl SessionOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => EXIT_COMPLETED,
            Self::Aborted { .. } => EXIT_ABORTED,
        }
    }

    pub fn report(&self) -> Option<&LoopReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Aborted { .. } => None,
        }
    }
}

impl From<&SessionConfig> for LoopSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            min_interval: config.min_interval(),
            deadline: config.deadline(),
            no_data_backoff: config.no_data_backoff(),
            gate_poll_interval: config.gate_poll_interval(),
        }
    }
}

pub struct Session<'a, B: StreamBackend> {
    config: &'a SessionConfig,
    gate: ControlGate,
    backend: B,
    operator: Option<OperatorLink>,
    retry: Option<RetryPolicy>,
}

impl<'a, B: StreamBackend> Session<'a, B> {
    pub fn new(config: &'a SessionConfig, gate: ControlGate, backend: B) -> Self {
        Self {
            config,
            gate,
            backend,
            operator: None,
            retry: None,
        }
    }

    /// Channel through which the operator picks among several streams
    pub fn with_operator(mut self, operator: OperatorLink) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Run the whole session on the calling thread.
    ///
    /// Setup failures are returned as errors; a Stop before acquisition
    /// starts is an `Aborted` outcome, not an error.
    pub fn run<P: WindowProcessor + ?Sized>(self, processor: &mut P) -> Result<SessionOutcome> {
        let mut acquisition = AcquisitionLoop::new(self.gate.clone(), LoopSettings::from(self.config));

        if !acquisition.await_start() {
            return Ok(SessionOutcome::Aborted {
                reason: "session was never started".to_string(),
            });
        }

        let mut receiver = match self.connect() {
            Ok(receiver) => receiver,
            Err(NfbError::Aborted(reason)) => {
                log::warn!("Session aborted: {}", reason);
                return Ok(SessionOutcome::Aborted { reason });
            }
            Err(e) => {
                if e.is_setup_error() {
                    log::error!("Session setup failed: {}", e);
                }
                return Err(e);
            }
        };

        let report = acquisition.run(&mut receiver, processor)?;
        if !report.termination.is_normal() {
            // Stop arrived while locating or connecting
            log::warn!("Session stopped before acquisition started");
            return Ok(SessionOutcome::Aborted {
                reason: "stopped before acquisition started".to_string(),
            });
        }
        Ok(SessionOutcome::Completed(report))
    }

    fn connect(&self) -> Result<StreamReceiver> {
        let mut locator = StreamLocator::new(&self.backend)
            .with_discovery_timeout(self.config.discovery_timeout())
            .with_poll_interval(self.config.gate_poll_interval());
        if let Some(retry) = self.retry {
            locator = locator.with_retry(retry);
        }
        if let Some(operator) = self.operator.as_ref() {
            locator = locator.with_operator(operator.clone());
        }

        let descriptor = locator.resolve(&self.config.stream_descriptor(), &self.gate)?;

        StreamReceiver::connect(
            &self.backend,
            &descriptor,
            self.config.window_size_seconds,
            self.config.buffer_size_seconds,
            self.config.discovery_timeout(),
        )
    }
}
