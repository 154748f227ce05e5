use crate::streaming::{CsvExport, StreamError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type ClassifierResult<T> = Result<T, ClassifierError>;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Classifier returned status {0}")]
    Status(u16),

    #[error("Classifier endpoint not configured")]
    NotConfigured,

    #[error("Failed to export buffers: {0}")]
    Export(#[from] StreamError),
}

/// Per-label classifier output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelPrediction {
    pub proba: f64,
    pub pred: f64,
}

impl LabelPrediction {
    /// Any non-zero integer part counts as a positive decision
    pub fn is_positive(&self) -> bool {
        self.pred.trunc() != 0.0
    }

    /// Probability as a whole percentage, truncated
    pub fn percent(&self) -> i64 {
        (self.proba * 100.0).trunc() as i64
    }
}

/// Label to prediction, iterated in label order
pub type Predictions = BTreeMap<String, LabelPrediction>;

/// Extract `{predictions: {label: {proba, pred}}}` from a response body.
///
/// Anything that does not match yields no predictions for that part: a body
/// without a `predictions` object gives an empty map, a label entry missing
/// a numeric `proba` or `pred` is skipped.
pub fn parse_predictions(body: &Value) -> Predictions {
    let Some(map) = body.get("predictions").and_then(Value::as_object) else {
        return Predictions::new();
    };
    map.iter()
        .filter_map(|(label, entry)| {
            let proba = entry.get("proba")?.as_f64()?;
            let pred = entry.get("pred")?.as_f64()?;
            Some((label.clone(), LabelPrediction { proba, pred }))
        })
        .collect()
}

/// External model scoring the two exported series
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, export: CsvExport, threshold: f64) -> ClassifierResult<Predictions>;
}
