// Common types for the streaming module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur during streaming operations
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Emulator error: {0}")]
    Emulator(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session already running")]
    AlreadyRunning,

    #[error("No active session")]
    NoActiveSession,

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// One physiological signal stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Fetal heart rate, beats per minute
    Bpm,
    /// Uterine activity
    Uterus,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Bpm, Channel::Uterus];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Bpm => "bpm",
            Channel::Uterus => "uterus",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bpm" => Ok(Channel::Bpm),
            "uterus" => Ok(Channel::Uterus),
            other => Err(StreamError::UnknownChannel(other.to_string())),
        }
    }
}

/// A single `(time, value)` reading.
///
/// `time` is seconds since session start. Serialized as a two-element
/// array `[t, v]`, the shape viewers and the persistence layer expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((time, value): (f64, f64)) -> Self {
        Self { time, value }
    }
}

impl From<Sample> for (f64, f64) {
    fn from(s: Sample) -> Self {
        (s.time, s.value)
    }
}

/// Immutable, lock-consistent copy of both channels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub bpm: Vec<Sample>,
    pub uterus: Vec<Sample>,
    pub latest_time: f64,
}

impl Snapshot {
    pub fn channel(&self, channel: Channel) -> &[Sample] {
        match channel {
            Channel::Bpm => &self.bpm,
            Channel::Uterus => &self.uterus,
        }
    }

    /// Last value of a channel, 0.0 when the channel is empty
    pub fn last_value(&self, channel: Channel) -> f64 {
        self.channel(channel).last().map(|s| s.value).unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.bpm.is_empty() && self.uterus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        assert_eq!("bpm".parse::<Channel>().unwrap(), Channel::Bpm);
        assert_eq!(" Uterus ".parse::<Channel>().unwrap(), Channel::Uterus);
        assert!("spo2".parse::<Channel>().is_err());
    }

    #[test]
    fn test_sample_serializes_as_pair() {
        let json = serde_json::to_string(&Sample::new(1.5, 140.0)).unwrap();
        assert_eq!(json, "[1.5,140.0]");

        let back: Sample = serde_json::from_str("[2.0, 30.5]").unwrap();
        assert_eq!(back, Sample::new(2.0, 30.5));
    }

    #[test]
    fn test_snapshot_last_value_defaults_to_zero() {
        let snap = Snapshot {
            bpm: vec![Sample::new(0.0, 120.0), Sample::new(0.25, 125.0)],
            uterus: vec![],
            latest_time: 0.25,
        };
        assert_eq!(snap.last_value(Channel::Bpm), 125.0);
        assert_eq!(snap.last_value(Channel::Uterus), 0.0);
    }
}
