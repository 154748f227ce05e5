//! Signal Processing Module
//!
//! Pure functions over time-sorted `(time, value)` series:
//! - Hampel despiking, moving-average smoothing and rate clamping
//! - Contraction detection on the uterine-activity channel
//!
//! Windows are defined in seconds, not sample counts, so irregular sampling
//! is handled without resampling.

mod cleaner;
mod contractions;
mod window;

pub use cleaner::{
    clamp_rate, clean, despike, smooth, CleanerConfig, DespikeConfig, SignalCleaner,
    SpikeReplacement, MAD_FLOOR, MAD_TO_SIGMA,
};
pub use contractions::{
    count_contractions, detect_contractions, ema_time_aware, merge_episodes, rolling_median,
    ContractionDetector, DetectorConfig, Episode,
};
