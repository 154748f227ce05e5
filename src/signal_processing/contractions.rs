//! Contraction Detection
//!
//! Extracts contraction episodes from the uterine-activity channel:
//! 1. Time-aware exponential smoothing (EMA with `alpha = 1 - exp(-dt/tau)`)
//! 2. Baseline as a trailing rolling median of the smoothed series
//! 3. Hysteresis over `smoothed - baseline` with duration/amplitude filters
//! 4. Merging of episodes separated by a short gap
//!
//! Every call recomputes from scratch. The output depends only on the input
//! samples and the [`DetectorConfig`].

use super::window::{median_in_place, TimeWindow};
use crate::streaming::Sample;
use serde::{Deserialize, Serialize};

/// Smallest time step used by the EMA when timestamps repeat
const MIN_DT: f64 = 1e-6;

/// Series shorter than this never yield an episode
const MIN_SAMPLES: usize = 3;

/// Detector parameters. Thresholds are in signal units, times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// EMA time constant
    #[serde(default = "default_tau")]
    pub tau: f64,

    /// Trailing window for the rolling-median baseline
    #[serde(default = "default_baseline_window")]
    pub baseline_window: f64,

    /// Deviation above baseline that opens an episode
    #[serde(default = "default_threshold")]
    pub th_high: f64,

    /// Deviation at or below which an open episode closes
    #[serde(default = "default_threshold")]
    pub th_low: f64,

    #[serde(default = "default_min_duration")]
    pub min_duration: f64,

    /// Minimum `peak - baseline_at_entry`
    #[serde(default = "default_min_amplitude")]
    pub min_amplitude: f64,

    /// Episodes closer than this are merged
    #[serde(default = "default_merge_gap")]
    pub merge_gap: f64,
}

fn default_tau() -> f64 {
    6.0
}
fn default_baseline_window() -> f64 {
    150.0
}
fn default_threshold() -> f64 {
    15.0
}
fn default_min_duration() -> f64 {
    25.0
}
fn default_min_amplitude() -> f64 {
    8.0
}
fn default_merge_gap() -> f64 {
    30.0
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tau: default_tau(),
            baseline_window: default_baseline_window(),
            th_high: default_threshold(),
            th_low: default_threshold(),
            min_duration: default_min_duration(),
            min_amplitude: default_min_amplitude(),
            merge_gap: default_merge_gap(),
        }
    }
}

/// A detected contraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub start: f64,
    pub end: f64,
    pub peak_time: f64,
    pub peak_value: f64,
    pub amplitude: f64,
}

impl Episode {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Exponential smoothing corrected for irregular sampling
pub fn ema_time_aware(data: &[Sample], tau: f64) -> Vec<Sample> {
    let Some(first) = data.first() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(data.len());
    let mut y = first.value;
    let mut t_prev = first.time;
    out.push(*first);

    for sample in &data[1..] {
        let dt = (sample.time - t_prev).max(MIN_DT);
        let alpha = 1.0 - (-dt / tau).exp();
        y += alpha * (sample.value - y);
        out.push(Sample::new(sample.time, y));
        t_prev = sample.time;
    }
    out
}

/// Median of values within `[t_i - window, t_i]` for every point.
///
/// Each window is copied and fully sorted, so cost is O(n * window) rather
/// than O(n log n). Display windows are short enough that this is fine.
pub fn rolling_median(data: &[Sample], window: f64) -> Vec<Sample> {
    let mut scan = TimeWindow::new(data);
    let mut scratch: Vec<f64> = Vec::new();
    data.iter()
        .enumerate()
        .map(|(i, sample)| {
            let range = scan.trailing(i, window);
            scratch.clear();
            scratch.extend(data[range].iter().map(|s| s.value));
            Sample::new(sample.time, median_in_place(&mut scratch))
        })
        .collect()
}

/// State of an episode while the deviation is above threshold
struct OpenEpisode {
    start: f64,
    baseline_at_entry: f64,
    peak_time: f64,
    peak_value: f64,
}

impl OpenEpisode {
    fn close(&self, end: f64, config: &DetectorConfig) -> Option<Episode> {
        let episode = Episode {
            start: self.start,
            end,
            peak_time: self.peak_time,
            peak_value: self.peak_value,
            amplitude: self.peak_value - self.baseline_at_entry,
        };
        (episode.duration() >= config.min_duration && episode.amplitude >= config.min_amplitude)
            .then_some(episode)
    }
}

/// Detect and merge contraction episodes in a uterine-activity series
pub fn detect_contractions(uterus: &[Sample], config: &DetectorConfig) -> Vec<Episode> {
    if uterus.len() < MIN_SAMPLES {
        return Vec::new();
    }

    let smoothed = ema_time_aware(uterus, config.tau);
    let baseline = rolling_median(&smoothed, config.baseline_window);

    let mut episodes = Vec::new();
    let mut open: Option<OpenEpisode> = None;

    for (s, b) in smoothed.iter().zip(baseline.iter()) {
        let deviation = s.value - b.value;
        match open.as_mut() {
            None => {
                if deviation >= config.th_high {
                    open = Some(OpenEpisode {
                        start: s.time,
                        baseline_at_entry: b.value,
                        peak_time: s.time,
                        peak_value: s.value,
                    });
                }
            }
            Some(current) => {
                if s.value > current.peak_value {
                    current.peak_value = s.value;
                    current.peak_time = s.time;
                }
                if deviation <= config.th_low {
                    episodes.extend(current.close(s.time, config));
                    open = None;
                }
            }
        }
    }

    // still inside an episode when the series ends
    if let (Some(current), Some(last)) = (open, smoothed.last()) {
        episodes.extend(current.close(last.time, config));
    }

    merge_episodes(episodes, config.merge_gap)
}

/// Sort by start and merge neighbours whose gap is at most `merge_gap`.
///
/// The merged episode spans both, keeps the higher peak and the larger of
/// the two amplitudes. Amplitude is not recomputed against a new baseline.
pub fn merge_episodes(mut episodes: Vec<Episode>, merge_gap: f64) -> Vec<Episode> {
    episodes.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Episode> = Vec::with_capacity(episodes.len());
    for next in episodes {
        match merged.last_mut() {
            Some(current) if next.start - current.end <= merge_gap => {
                current.end = current.end.max(next.end);
                if next.peak_value > current.peak_value {
                    current.peak_time = next.peak_time;
                    current.peak_value = next.peak_value;
                }
                current.amplitude = current.amplitude.max(next.amplitude);
            }
            _ => merged.push(next),
        }
    }
    merged
}

pub fn count_contractions(uterus: &[Sample], config: &DetectorConfig) -> usize {
    detect_contractions(uterus, config).len()
}

/// Contraction detector bound to a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct ContractionDetector {
    config: DetectorConfig,
}

impl ContractionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detect(&self, uterus: &[Sample]) -> Vec<Episode> {
        detect_contractions(uterus, &self.config)
    }

    pub fn count(&self, uterus: &[Sample]) -> usize {
        count_contractions(uterus, &self.config)
    }
}
