//! Time-windowed scanning helpers shared by the cleaner and the detector.
//!
//! Input series are always time-sorted, so window boundaries only ever move
//! forward: each call to [`TimeWindow::centered`] or [`TimeWindow::trailing`]
//! resumes from the previous boundaries instead of rescanning.

use crate::streaming::Sample;
use std::ops::Range;

/// Two-pointer window over a time-sorted series
pub(crate) struct TimeWindow<'a> {
    samples: &'a [Sample],
    start: usize,
    end: usize,
}

impl<'a> TimeWindow<'a> {
    pub fn new(samples: &'a [Sample]) -> Self {
        Self {
            samples,
            start: 0,
            end: 0,
        }
    }

    /// Indices of samples within `[t_i - half, t_i + half]`.
    ///
    /// Must be called with non-decreasing `i`.
    pub fn centered(&mut self, i: usize, half: f64) -> Range<usize> {
        let t = self.samples[i].time;
        self.advance_start(i, t - half);
        if self.end < i {
            self.end = i;
        }
        while self.end + 1 < self.samples.len() && self.samples[self.end + 1].time <= t + half {
            self.end += 1;
        }
        self.start..self.end + 1
    }

    /// Indices of samples within `[t_i - span, t_i]`, ending exactly at `i`.
    ///
    /// Must be called with non-decreasing `i`.
    pub fn trailing(&mut self, i: usize, span: f64) -> Range<usize> {
        let t = self.samples[i].time;
        self.advance_start(i, t - span);
        self.start..i + 1
    }

    fn advance_start(&mut self, i: usize, lower: f64) {
        while self.start < i && self.samples[self.start].time < lower {
            self.start += 1;
        }
    }
}

/// Median of `values`, sorting them in place. 0.0 for an empty slice.
pub(crate) fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = n / 2;
    if n % 2 == 1 {
        values[mid]
    } else {
        0.5 * (values[mid - 1] + values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(times: &[f64]) -> Vec<Sample> {
        times.iter().map(|&t| Sample::new(t, 0.0)).collect()
    }

    #[test]
    fn test_centered_window_edges() {
        let data = series(&[0.0, 0.1, 0.2, 0.3, 1.0, 1.1]);
        let mut window = TimeWindow::new(&data);
        assert_eq!(window.centered(0, 0.15), 0..2);
        assert_eq!(window.centered(1, 0.15), 0..3);
        assert_eq!(window.centered(3, 0.15), 2..4);
        assert_eq!(window.centered(4, 0.15), 4..6);
        assert_eq!(window.centered(5, 0.15), 4..6);
    }

    #[test]
    fn test_trailing_window_ends_at_index() {
        let data = series(&[0.0, 1.0, 2.0, 2.0, 5.0]);
        let mut window = TimeWindow::new(&data);
        assert_eq!(window.trailing(0, 2.0), 0..1);
        assert_eq!(window.trailing(2, 2.0), 0..3);
        assert_eq!(window.trailing(3, 1.5), 1..4);
        assert_eq!(window.trailing(4, 2.0), 4..5);
    }

    #[test]
    fn test_median() {
        assert_eq!(median_in_place(&mut []), 0.0);
        assert_eq!(median_in_place(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
