use crate::streaming::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Recorded study collection a session replays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Hypoxia,
    Regular,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Hypoxia => "hypoxia",
            Dataset::Regular => "regular",
        }
    }

    /// Highest valid study number; numbering starts at 1
    pub fn max_study_number(&self) -> u32 {
        match self {
            Dataset::Hypoxia => 50,
            Dataset::Regular => 160,
        }
    }

    pub fn contains(&self, study_number: u32) -> bool {
        (1..=self.max_study_number()).contains(&study_number)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hypoxia" => Ok(Dataset::Hypoxia),
            "regular" => Ok(Dataset::Regular),
            other => Err(format!("unknown dataset: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Error)
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(SessionStatus::Starting),
            "running" => Ok(SessionStatus::Running),
            "stopped" => Ok(SessionStatus::Stopped),
            "error" => Ok(SessionStatus::Error),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Fields needed to create a session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: Uuid,
    pub user_name: Option<String>,
    pub dataset: Dataset,
    pub study_number: u32,
}

/// Persisted full trace of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    #[serde(default)]
    pub bpm: Vec<Sample>,
    #[serde(default)]
    pub uterus: Vec<Sample>,
    #[serde(default = "default_record_window")]
    pub window_seconds: f64,
}

fn default_record_window() -> f64 {
    180.0
}

impl Default for PipelineRecord {
    fn default() -> Self {
        Self {
            bpm: Vec::new(),
            uterus: Vec::new(),
            window_seconds: default_record_window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_study_number_ranges() {
        assert!(Dataset::Hypoxia.contains(1));
        assert!(Dataset::Hypoxia.contains(50));
        assert!(!Dataset::Hypoxia.contains(51));
        assert!(!Dataset::Regular.contains(0));
        assert!(Dataset::Regular.contains(160));
    }

    #[test]
    fn test_pipeline_record_json() {
        let record = PipelineRecord {
            bpm: vec![Sample::new(0.5, 141.0)],
            uterus: Vec::new(),
            window_seconds: 180.0,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"bpm":[[0.5,141.0]],"uterus":[],"window_seconds":180.0}"#);

        let empty: PipelineRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, PipelineRecord::default());
    }
}
