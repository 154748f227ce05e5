//! Signal Cleaning
//!
//! Three-stage pipeline applied independently to each channel:
//! 1. Hampel despiking in a centered time window
//! 2. Centered time-window moving average
//! 3. Optional rate-of-change clamp
//!
//! All stages preserve length and timestamps of their input.

use super::window::{median_in_place, TimeWindow};
use crate::streaming::Sample;
use serde::{Deserialize, Serialize};

/// Converts a median absolute deviation to a Gaussian-equivalent sigma
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Floor applied to the MAD so flat windows do not divide by zero
pub const MAD_FLOOR: f64 = 1e-9;

/// Smallest time step used when timestamps repeat
const MIN_DT: f64 = 1e-6;

/// How a detected spike is replaced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeReplacement {
    /// Window median
    #[default]
    Median,
    /// Linear interpolation between the raw left/right neighbors
    Interpolate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DespikeConfig {
    /// Half-width of the window in seconds
    #[serde(default = "default_hampel_window")]
    pub half_window: f64,

    /// Threshold in sigmas
    #[serde(default = "default_hampel_sigma")]
    pub n_sigma: f64,

    #[serde(default)]
    pub replacement: SpikeReplacement,
}

fn default_hampel_window() -> f64 {
    0.5
}
fn default_hampel_sigma() -> f64 {
    3.0
}
fn default_smoothing_window() -> f64 {
    0.3
}

impl Default for DespikeConfig {
    fn default() -> Self {
        Self {
            half_window: default_hampel_window(),
            n_sigma: default_hampel_sigma(),
            replacement: SpikeReplacement::Median,
        }
    }
}

/// Configuration for the full cleaning pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanerConfig {
    #[serde(default)]
    pub despike: DespikeConfig,

    /// Half-width of the moving-average window in seconds
    #[serde(default = "default_smoothing_window")]
    pub smoothing_half_window: f64,

    /// Maximum change per second; `None` skips the clamp stage
    #[serde(default)]
    pub max_rate: Option<f64>,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            despike: DespikeConfig::default(),
            smoothing_half_window: default_smoothing_window(),
            max_rate: None,
        }
    }
}

/// Replace outliers using a time-windowed Hampel filter
pub fn despike(data: &[Sample], config: &DespikeConfig) -> Vec<Sample> {
    let mut window = TimeWindow::new(data);
    let mut scratch: Vec<f64> = Vec::new();
    let mut out = Vec::with_capacity(data.len());

    for (i, sample) in data.iter().enumerate() {
        let range = window.centered(i, config.half_window);

        scratch.clear();
        scratch.extend(data[range].iter().map(|s| s.value));
        let med = median_in_place(&mut scratch);

        for v in scratch.iter_mut() {
            *v = (*v - med).abs();
        }
        let mad = median_in_place(&mut scratch).max(MAD_FLOOR);
        let sigma = MAD_TO_SIGMA * mad;

        let value = if (sample.value - med).abs() > config.n_sigma * sigma {
            match config.replacement {
                SpikeReplacement::Median => med,
                SpikeReplacement::Interpolate => interpolate_neighbors(data, i).unwrap_or(med),
            }
        } else {
            sample.value
        };
        out.push(Sample::new(sample.time, value));
    }
    out
}

fn interpolate_neighbors(data: &[Sample], i: usize) -> Option<f64> {
    let left = data.get(i.checked_sub(1)?)?;
    let right = data.get(i + 1)?;
    if right.time == left.time {
        return None;
    }
    let alpha = (data[i].time - left.time) / (right.time - left.time);
    Some(left.value + alpha * (right.value - left.value))
}

/// Unweighted mean of all values within `[t_i - half, t_i + half]`
pub fn smooth(data: &[Sample], half_window: f64) -> Vec<Sample> {
    let mut window = TimeWindow::new(data);
    data.iter()
        .enumerate()
        .map(|(i, sample)| {
            let range = window.centered(i, half_window);
            let count = range.len().max(1);
            let sum: f64 = data[range].iter().map(|s| s.value).sum();
            Sample::new(sample.time, sum / count as f64)
        })
        .collect()
}

/// Bound `|v_i - v_{i-1}|` by `max_rate * dt`, walking the output in order
pub fn clamp_rate(data: &[Sample], max_rate: f64) -> Vec<Sample> {
    let mut out: Vec<Sample> = Vec::with_capacity(data.len());
    for sample in data {
        let next = match out.last() {
            None => *sample,
            Some(prev) => {
                let dt = (sample.time - prev.time).max(MIN_DT);
                let max_dv = max_rate * dt;
                let dv = sample.value - prev.value;
                if dv.abs() > max_dv {
                    Sample::new(sample.time, prev.value + max_dv.copysign(dv))
                } else {
                    *sample
                }
            }
        };
        out.push(next);
    }
    out
}

/// Despike, smooth and optionally rate-clamp one channel
pub fn clean(data: &[Sample], config: &CleanerConfig) -> Vec<Sample> {
    let despiked = despike(data, &config.despike);
    let smoothed = smooth(&despiked, config.smoothing_half_window);
    match config.max_rate {
        Some(rate) => clamp_rate(&smoothed, rate),
        None => smoothed,
    }
}

/// Cleaning pipeline bound to a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct SignalCleaner {
    config: CleanerConfig,
}

impl SignalCleaner {
    pub fn new(config: CleanerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    pub fn clean(&self, data: &[Sample]) -> Vec<Sample> {
        clean(data, &self.config)
    }
}
