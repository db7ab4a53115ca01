// Default window processor of the CLI
//
// Computes per-channel RMS of every accepted window on the session's rayon
// pool and keeps a running mean, which ends up in the JSON report.

use nfb_rs::{Window, WindowProcessor};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;

const PROGRESS_EVERY: u64 = 10;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelSummary {
    pub windows: u64,
    pub samples: u64,
    /// Mean over windows of the per-window RMS, one value per channel
    pub mean_rms: Vec<f64>,
}

pub struct RmsSummary {
    pool: ThreadPool,
    summary: ChannelSummary,
}

impl RmsSummary {
    pub fn new(pool: ThreadPool) -> Self {
        Self {
            pool,
            summary: ChannelSummary::default(),
        }
    }

    pub fn into_summary(self) -> ChannelSummary {
        self.summary
    }
}

fn window_rms(window: &Window) -> Vec<f64> {
    let channels: Vec<_> = window.data().outer_iter().collect();
    channels
        .par_iter()
        .map(|channel| {
            if channel.is_empty() {
                return 0.0;
            }
            let sum_sq: f64 = channel.iter().map(|&v| (v as f64) * (v as f64)).sum();
            (sum_sq / channel.len() as f64).sqrt()
        })
        .collect()
}

impl WindowProcessor for RmsSummary {
    fn process(&mut self, window: &Window) -> anyhow::Result<()> {
        let rms = self.pool.install(|| window_rms(window));

        let summary = &mut self.summary;
        if summary.mean_rms.is_empty() {
            summary.mean_rms = vec![0.0; rms.len()];
        }
        anyhow::ensure!(
            rms.len() == summary.mean_rms.len(),
            "window has {} channels, expected {}",
            rms.len(),
            summary.mean_rms.len()
        );

        summary.windows += 1;
        summary.samples += window.num_samples() as u64;
        let n = summary.windows as f64;
        for (mean, value) in summary.mean_rms.iter_mut().zip(&rms) {
            *mean += (value - *mean) / n;
        }

        if summary.windows % PROGRESS_EVERY == 0 {
            log::info!(
                "{} windows processed, last timestamp {:.3}",
                summary.windows,
                window.last_timestamp().unwrap_or_default()
            );
        }
        log::debug!("Window RMS: {:?}", rms);
        Ok(())
    }
}
