// Messages pushed to live viewers over the websocket

use crate::signal_processing::{ContractionDetector, SignalCleaner};
use crate::streaming::analytics::AnalyticsEvent;
use crate::streaming::types::{Channel, Sample, Snapshot};
use serde::Serialize;

/// Periodic broadcast built from the live window
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "snapshot", rename_all = "camelCase")]
pub struct ViewerPayload {
    /// Seconds since session start
    pub elapsed: f64,
    /// Cleaned heart-rate series
    pub bpm: Vec<Sample>,
    /// Cleaned uterine-activity series
    pub uterus: Vec<Sample>,
    /// Last raw bpm value
    pub heart_rate: f64,
    /// Last raw uterus value
    pub fetal_movement: f64,
    pub contractions: usize,
    pub analytics: Vec<AnalyticsEvent>,
}

impl ViewerPayload {
    /// Clean both channels and count contractions on the raw uterus channel
    pub fn build(
        snapshot: &Snapshot,
        elapsed: f64,
        analytics: Vec<AnalyticsEvent>,
        cleaner: &SignalCleaner,
        detector: &ContractionDetector,
    ) -> Self {
        Self {
            elapsed,
            bpm: cleaner.clean(&snapshot.bpm),
            uterus: cleaner.clean(&snapshot.uterus),
            heart_rate: snapshot.last_value(Channel::Bpm),
            fetal_movement: snapshot.last_value(Channel::Uterus),
            contractions: detector.count(&snapshot.uterus),
            analytics,
        }
    }
}

/// First message a viewer receives after connecting: the raw live window
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "snapshot")]
pub struct InitialSnapshot {
    pub latest_time: f64,
    pub bpm: Vec<Sample>,
    pub uterus: Vec<Sample>,
}

impl From<Snapshot> for InitialSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            latest_time: snapshot.latest_time,
            bpm: snapshot.bpm,
            uterus: snapshot.uterus,
        }
    }
}
