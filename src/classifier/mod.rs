// External classifier integration
//
// - `types`: error type, prediction model and the `Classifier` trait
// - `client`: multipart HTTP client for the model service
// - `recommend`: label to recommendation text
// - `flusher`: one classifier round trip feeding the analytics log

mod client;
mod flusher;
mod recommend;
mod types;

pub use client::{HttpClassifier, DEFAULT_CLASSIFIER_TIMEOUT_SECS};
pub use flusher::{ExternalFlusher, DEFAULT_CLASSIFIER_THRESHOLD};
pub use recommend::{RecommendationLookup, StaticRecommendations};
pub use types::{
    parse_predictions, Classifier, ClassifierError, ClassifierResult, LabelPrediction,
    Predictions,
};
