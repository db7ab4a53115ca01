// Acquisition loop
//
// AwaitStart -> Running -> Terminated. The gate is checked once per iteration
// (and during every sleep, which a Stop write interrupts), windows whose
// timestamps do not advance are treated as missing data, and accepted windows
// go to the injected processor before the pacer spaces out the next pull.

use crate::error::{NfbError, Result};
use crate::gate::{ControlGate, GateState};
use crate::pacer::Pacer;
use crate::stream::{Window, WindowSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DELAY_WARNING: &str = "There seems to be delay in receiving data.";

/// Per-window work injected into the loop.
///
/// Runs synchronously on the loop thread; it should return well within the
/// minimum iteration interval. An error ends the session.
pub trait WindowProcessor {
    fn process(&mut self, window: &Window) -> anyhow::Result<()>;
}

impl<F> WindowProcessor for F
where
    F: FnMut(&Window) -> anyhow::Result<()>,
{
    fn process(&mut self, window: &Window) -> anyhow::Result<()> {
        self(window)
    }
}

/// Timing knobs of the loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    /// Minimum wall-clock spacing between accepted windows
    pub min_interval: Duration,
    /// Session length, measured from entering `Running`
    pub deadline: Duration,
    /// Sleep after a missing or stale window
    pub no_data_backoff: Duration,
    /// Longest single wait on the gate while waiting for `Run`
    pub gate_poll_interval: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            deadline: Duration::from_secs(60),
            no_data_backoff: Duration::from_secs(1),
            gate_poll_interval: Duration::from_millis(50),
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The gate was `Stop` before the session was ever armed
    Unarmed,
    /// The gate turned to `Stop` while running
    Stopped,
    /// The session deadline elapsed
    DeadlineReached,
}

impl Termination {
    /// Unarmed sessions never reached `Running`
    pub fn is_normal(self) -> bool {
        !matches!(self, Self::Unarmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitStart,
    Running,
    Terminated(Termination),
}

/// Summary of one run of the loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    pub termination: Termination,
    pub accepted_windows: u64,
    /// Windows with no timestamp newer than the last accepted one
    pub stale_windows: u64,
    /// Pulls that returned no samples at all
    pub missing_data: u64,
    pub last_timestamp: Option<f64>,
    pub elapsed_seconds: f64,
}

/// Loop-internal continuity state
#[derive(Debug, Default)]
struct LoopState {
    last_timestamp: Option<f64>,
    accepted_windows: u64,
    stale_windows: u64,
    missing_data: u64,
}

pub struct AcquisitionLoop {
    gate: ControlGate,
    settings: LoopSettings,
    phase: Phase,
}

impl AcquisitionLoop {
    pub fn new(gate: ControlGate, settings: LoopSettings) -> Self {
        Self {
            gate,
            settings,
            phase: Phase::AwaitStart,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Block while the gate says `Wait`.
    ///
    /// Returns `true` once the gate says `Run`; `false` (and moves to
    /// `Terminated(Unarmed)`) if it says `Stop`.
    pub fn await_start(&mut self) -> bool {
        if self.phase != Phase::AwaitStart {
            return matches!(self.phase, Phase::Running);
        }

        let mut announced = false;
        loop {
            match self.gate.wait_while_waiting(self.settings.gate_poll_interval) {
                GateState::Wait => {
                    if !announced {
                        log::info!("Waiting for the operator to start the session");
                        announced = true;
                    }
                }
                GateState::Run => {
                    log::info!("Session armed");
                    return true;
                }
                GateState::Stop => {
                    log::warn!("Session stopped before it was started");
                    self.phase = Phase::Terminated(Termination::Unarmed);
                    return false;
                }
            }
        }
    }

    /// Run the acquisition phase until `Stop` or the deadline.
    ///
    /// Calls [`AcquisitionLoop::await_start`] first if it has not been called.
    pub fn run<S, P>(&mut self, source: &mut S, processor: &mut P) -> Result<LoopReport>
    where
        S: WindowSource + ?Sized,
        P: WindowProcessor + ?Sized,
    {
        let mut pacer = Pacer::new();
        let mut state = LoopState::default();

        if self.phase == Phase::AwaitStart && !self.await_start() {
            return Ok(self.report(Termination::Unarmed, &state, &pacer));
        }
        if let Phase::Terminated(termination) = self.phase {
            return Ok(self.report(termination, &state, &pacer));
        }

        // The session clock starts with the first pull
        pacer = Pacer::new();
        self.phase = Phase::Running;
        log::info!(
            "Acquisition running: {:.1} Hz, trigger channel {:?}, min interval {:.3}s, deadline {:.1}s",
            source.sample_rate(),
            source.trigger_channel_index(),
            self.settings.min_interval.as_secs_f64(),
            self.settings.deadline.as_secs_f64()
        );

        let termination = loop {
            if let Some(termination) = self.check_gate(&pacer) {
                break termination;
            }

            let window = match source.acquire_and_get_window() {
                Ok(window) => window,
                Err(NfbError::NoNewData(_)) => {
                    state.missing_data += 1;
                    self.delay_backoff();
                    continue;
                }
                Err(e) => {
                    log::error!("Acquisition failed: {}", e);
                    self.phase = Phase::Terminated(Termination::Stopped);
                    return Err(e);
                }
            };

            let Some(first_new) = window.first_new_index(state.last_timestamp) else {
                state.stale_windows += 1;
                self.delay_backoff();
                continue;
            };
            log::trace!(
                "Window with {} new of {} samples",
                window.num_samples() - first_new,
                window.num_samples()
            );

            if let Err(e) = processor.process(&window) {
                log::error!("Window processing failed: {:#}", e);
                self.phase = Phase::Terminated(Termination::Stopped);
                return Err(NfbError::Processing(e));
            }
            state.accepted_windows += 1;

            if let Some(ts) = window.last_timestamp() {
                state.last_timestamp = Some(state.last_timestamp.map_or(ts, |last| last.max(ts)));
            }

            let gate = &self.gate;
            pacer.sleep_at_least_with(self.settings.min_interval, |remaining| {
                gate.sleep_unless_stopped(remaining);
            });
        };

        self.phase = Phase::Terminated(termination);
        let report = self.report(termination, &state, &pacer);
        log::info!(
            "Acquisition finished ({:?}) after {:.2}s: {} windows processed, {} stale, {} empty pulls",
            termination,
            report.elapsed_seconds,
            report.accepted_windows,
            report.stale_windows,
            report.missing_data
        );
        Ok(report)
    }

    /// `Some` when the loop must end; pauses while the gate says `Wait`
    fn check_gate(&self, pacer: &Pacer) -> Option<Termination> {
        let mut paused = false;
        loop {
            if pacer.deadline_exceeded(self.settings.deadline) {
                return Some(Termination::DeadlineReached);
            }
            match self.gate.read() {
                GateState::Stop => return Some(Termination::Stopped),
                GateState::Run => {
                    if paused {
                        log::info!("Acquisition resumed");
                    }
                    return None;
                }
                GateState::Wait => {
                    if !paused {
                        log::info!("Acquisition paused by the operator");
                        paused = true;
                    }
                    let remaining = self.settings.deadline.saturating_sub(pacer.elapsed());
                    self.gate
                        .wait_while_waiting(remaining.min(self.settings.gate_poll_interval));
                }
            }
        }
    }

    fn delay_backoff(&self) {
        log::warn!("{}", DELAY_WARNING);
        self.gate.sleep_unless_stopped(self.settings.no_data_backoff);
    }

    fn report(&self, termination: Termination, state: &LoopState, pacer: &Pacer) -> LoopReport {
        LoopReport {
            termination,
            accepted_windows: state.accepted_windows,
            stale_windows: state.stale_windows,
            missing_data: state.missing_data,
            last_timestamp: state.last_timestamp,
            elapsed_seconds: pacer.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::collections::VecDeque;

    /// Serves scripted windows, then stops the gate
    struct ScriptedSource {
        windows: VecDeque<Result<Window>>,
        gate: ControlGate,
    }

    impl ScriptedSource {
        fn new(gate: &ControlGate, script: Vec<Option<Vec<f64>>>) -> Self {
            let windows = script
                .into_iter()
                .map(|entry| match entry {
                    Some(timestamps) => {
                        let data = Array2::zeros((2, timestamps.len()));
                        Ok(Window::new(data, timestamps).unwrap())
                    }
                    None => Err(NfbError::NoNewData(0.0)),
                })
                .collect();
            Self {
                windows,
                gate: gate.clone(),
            }
        }
    }

    impl WindowSource for ScriptedSource {
        fn sample_rate(&self) -> f64 {
            100.0
        }

        fn trigger_channel_index(&self) -> Option<usize> {
            None
        }

        fn acquire_and_get_window(&mut self) -> Result<Window> {
            match self.windows.pop_front() {
                Some(next) => next,
                None => {
                    self.gate.write(GateState::Stop);
                    Err(NfbError::NoNewData(0.0))
                }
            }
        }
    }

    fn fast_settings() -> LoopSettings {
        LoopSettings {
            min_interval: Duration::ZERO,
            deadline: Duration::from_secs(10),
            no_data_backoff: Duration::from_millis(1),
            gate_poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_unarmed_session() {
        let gate = ControlGate::new(GateState::Stop);
        let mut source = ScriptedSource::new(&gate, vec![Some(vec![1.0])]);
        let mut calls = 0;
        let mut processor = |_: &Window| -> anyhow::Result<()> {
            calls += 1;
            Ok(())
        };

        let mut acquisition = AcquisitionLoop::new(gate, fast_settings());
        let report = acquisition.run(&mut source, &mut processor).unwrap();

        assert_eq!(report.termination, Termination::Unarmed);
        assert!(!report.termination.is_normal());
        assert_eq!(acquisition.phase(), Phase::Terminated(Termination::Unarmed));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_first_window_always_accepted() {
        let gate = ControlGate::new(GateState::Run);
        let mut source = ScriptedSource::new(&gate, vec![Some(vec![-5.0, -4.0])]);
        let mut calls = 0;
        let mut processor = |_: &Window| -> anyhow::Result<()> {
            calls += 1;
            Ok(())
        };

        let report = AcquisitionLoop::new(gate, fast_settings())
            .run(&mut source, &mut processor)
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(report.last_timestamp, Some(-4.0));
        assert_eq!(report.termination, Termination::Stopped);
    }

    #[test]
    fn test_stale_and_missing_windows_skipped() {
        let gate = ControlGate::new(GateState::Run);
        let script = vec![
            Some(vec![0.0, 0.1]),
            Some(vec![0.0, 0.1]),
            None,
            Some(vec![0.1, 0.2]),
            Some(vec![0.05, 0.1]),
        ];
        let mut source = ScriptedSource::new(&gate, script);
        let mut seen = Vec::new();
        let mut processor = |w: &Window| -> anyhow::Result<()> {
            seen.push(w.last_timestamp().unwrap());
            Ok(())
        };

        let report = AcquisitionLoop::new(gate, fast_settings())
            .run(&mut source, &mut processor)
            .unwrap();

        assert_eq!(seen, vec![0.1, 0.2]);
        assert_eq!(report.accepted_windows, 2);
        assert_eq!(report.stale_windows, 2);
        // one scripted gap plus the final pull that stops the gate
        assert_eq!(report.missing_data, 2);
    }

    #[test]
    fn test_processor_error_is_fatal() {
        let gate = ControlGate::new(GateState::Run);
        let mut source = ScriptedSource::new(&gate, vec![Some(vec![1.0]), Some(vec![2.0])]);
        let mut processor = |_: &Window| -> anyhow::Result<()> { anyhow::bail!("feedback failed") };

        let result = AcquisitionLoop::new(gate, fast_settings()).run(&mut source, &mut processor);

        assert!(matches!(result, Err(NfbError::Processing(_))));
    }

    #[test]
    fn test_connection_error_is_fatal() {
        struct BrokenSource;

        impl WindowSource for BrokenSource {
            fn sample_rate(&self) -> f64 {
                100.0
            }

            fn trigger_channel_index(&self) -> Option<usize> {
                Some(0)
            }

            fn acquire_and_get_window(&mut self) -> Result<Window> {
                Err(NfbError::Connection("amplifier unplugged".to_string()))
            }
        }

        let gate = ControlGate::new(GateState::Run);
        let mut processor = |_: &Window| -> anyhow::Result<()> { Ok(()) };

        let result = AcquisitionLoop::new(gate, fast_settings()).run(&mut BrokenSource, &mut processor);

        assert!(matches!(result, Err(NfbError::Connection(_))));
    }

    #[test]
    fn test_deadline_ends_run() {
        let gate = ControlGate::new(GateState::Run);
        let timestamps: Vec<Option<Vec<f64>>> = (0..1000).map(|i| Some(vec![i as f64])).collect();
        let mut source = ScriptedSource::new(&gate, timestamps);
        let mut processor = |_: &Window| -> anyhow::Result<()> { Ok(()) };
        let settings = LoopSettings {
            min_interval: Duration::from_millis(10),
            deadline: Duration::from_millis(50),
            ..fast_settings()
        };

        let report = AcquisitionLoop::new(gate, settings)
            .run(&mut source, &mut processor)
            .unwrap();

        assert_eq!(report.termination, Termination::DeadlineReached);
        assert!(report.accepted_windows >= 3 && report.accepted_windows <= 6);
    }

    #[test]
    fn test_wait_pauses_running_loop() {
        let gate = ControlGate::new(GateState::Run);
        let controller = gate.clone();
        let mut source = ScriptedSource::new(&gate, vec![Some(vec![1.0]), Some(vec![2.0])]);
        let mut calls = 0;
        let mut processor = |_: &Window| -> anyhow::Result<()> {
            calls += 1;
            if calls == 1 {
                controller.write(GateState::Wait);
                let resume = controller.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(30));
                    resume.write(GateState::Run);
                });
            }
            Ok(())
        };

        let report = AcquisitionLoop::new(gate, fast_settings())
            .run(&mut source, &mut processor)
            .unwrap();

        assert_eq!(report.accepted_windows, 2);
        assert!(report.elapsed_seconds >= 0.03);
    }
}
