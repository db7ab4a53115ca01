use crate::error::Result;
use ndarray::{Array2, ArrayView1};

/// The most recent samples of a stream, `[channels x samples]`, with one
/// timestamp per sample column.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    data: Array2<f32>,
    timestamps: Vec<f64>,
}

impl Window {
    /// Returns `None` when the column count and timestamp count disagree
    pub fn new(data: Array2<f32>, timestamps: Vec<f64>) -> Option<Self> {
        if data.ncols() != timestamps.len() {
            return None;
        }
        Some(Self { data, timestamps })
    }

    pub(crate) fn from_parts(data: Array2<f32>, timestamps: Vec<f64>) -> Self {
        debug_assert_eq!(data.ncols(), timestamps.len());
        Self { data, timestamps }
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn num_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn channel(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.num_channels()).then(|| self.data.row(index))
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Index of the first sample stamped strictly after `last_seen`.
    ///
    /// Timestamps are non-decreasing, so every sample from that index on is
    /// new. Returns `None` when nothing is newer.
    pub fn first_new_index(&self, last_seen: Option<f64>) -> Option<usize> {
        let index = match last_seen {
            Some(last) => self.timestamps.partition_point(|&ts| ts <= last),
            None => 0,
        };
        (index < self.timestamps.len()).then_some(index)
    }
}

/// Anything the acquisition loop can pull windows from
pub trait WindowSource {
    fn sample_rate(&self) -> f64;

    fn trigger_channel_index(&self) -> Option<usize>;

    /// Advance by at least one new batch and return the current window.
    ///
    /// Fails with `NfbError::NoNewData` when nothing arrived within the pull
    /// timeout.
    fn acquire_and_get_window(&mut self) -> Result<Window>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_shape_mismatch_rejected() {
        let data = array![[1.0f32, 2.0], [3.0, 4.0]];
        assert!(Window::new(data.clone(), vec![0.1]).is_none());
        assert!(Window::new(data, vec![0.1, 0.2]).is_some());
    }

    #[test]
    fn test_first_new_index() {
        let window = Window::new(array![[0.0f32, 0.0, 0.0, 0.0]], vec![1.0, 2.0, 2.0, 3.0]).unwrap();

        assert_eq!(window.first_new_index(None), Some(0));
        assert_eq!(window.first_new_index(Some(0.5)), Some(0));
        assert_eq!(window.first_new_index(Some(2.0)), Some(3));
        assert_eq!(window.first_new_index(Some(3.0)), None);
        assert_eq!(window.first_new_index(Some(10.0)), None);
    }

    #[test]
    fn test_channel_access() {
        let window = Window::new(array![[1.0f32, 2.0], [3.0, 4.0]], vec![0.0, 0.1]).unwrap();

        assert_eq!(window.num_channels(), 2);
        assert_eq!(window.num_samples(), 2);
        assert_eq!(window.channel(1).unwrap().to_vec(), vec![3.0, 4.0]);
        assert!(window.channel(2).is_none());
        assert_eq!(window.last_timestamp(), Some(0.1));
    }
}
