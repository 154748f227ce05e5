use super::recommend::RecommendationLookup;
use super::types::{Classifier, ClassifierError, ClassifierResult, Predictions};
use crate::streaming::{AnalyticsEvent, PipelineCoordinator};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_CLASSIFIER_THRESHOLD: f64 = 0.5;

/// Sends the full session trace to the classifier and records the outcome
pub struct ExternalFlusher {
    coordinator: Arc<PipelineCoordinator>,
    classifier: Option<Arc<dyn Classifier>>,
    recommendations: Arc<dyn RecommendationLookup>,
    threshold: f64,
}

impl ExternalFlusher {
    pub fn new(
        coordinator: Arc<PipelineCoordinator>,
        classifier: Option<Arc<dyn Classifier>>,
        recommendations: Arc<dyn RecommendationLookup>,
        threshold: f64,
    ) -> Self {
        Self {
            coordinator,
            classifier,
            recommendations,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn coordinator(&self) -> &Arc<PipelineCoordinator> {
        &self.coordinator
    }

    /// One classifier round trip.
    ///
    /// On success exactly one event is appended to the analytics log, listing
    /// a recommendation for every positive label in label order. On failure
    /// nothing is appended.
    pub async fn flush_once(&self) -> ClassifierResult<Predictions> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or(ClassifierError::NotConfigured)?;

        let export = self.coordinator.buffers().full.to_csv()?;
        let predictions = classifier.predict(export, self.threshold).await?;

        let recommendations: Vec<String> = predictions
            .iter()
            .filter(|(_, p)| p.is_positive())
            .map(|(label, p)| self.recommendations.recommend(label, p.percent()))
            .collect();

        info!(
            "Classifier returned {} label(s), {} positive",
            predictions.len(),
            recommendations.len()
        );
        self.coordinator
            .analytics()
            .append(AnalyticsEvent::now(recommendations));

        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{LabelPrediction, StaticRecommendations};
    use crate::streaming::{Channel, CsvExport, PipelineConfig, ViewerRegistry};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct FixedClassifier {
        predictions: Predictions,
        seen: Mutex<Vec<(CsvExport, f64)>>,
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn predict(&self, export: CsvExport, threshold: f64) -> ClassifierResult<Predictions> {
            self.seen.lock().push((export, threshold));
            Ok(self.predictions.clone())
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn predict(&self, _: CsvExport, _: f64) -> ClassifierResult<Predictions> {
            Err(ClassifierError::Status(503))
        }
    }

    fn coordinator() -> Arc<PipelineCoordinator> {
        let coord = PipelineCoordinator::new(
            Uuid::new_v4(),
            PipelineConfig::default(),
            ViewerRegistry::new(),
        );
        coord.enqueue(Channel::Bpm, 0.0, 140.0);
        coord.enqueue(Channel::Uterus, 0.0, 15.0);
        Arc::new(coord)
    }

    fn prediction(proba: f64, pred: f64) -> LabelPrediction {
        LabelPrediction { proba, pred }
    }

    #[tokio::test]
    async fn test_flush_appends_positive_labels_in_order() {
        let mut predictions = Predictions::new();
        predictions.insert("zeta".to_string(), prediction(0.8, 1.0));
        predictions.insert("alpha".to_string(), prediction(0.66, 1.0));
        predictions.insert("beta".to_string(), prediction(0.2, 0.0));

        let classifier = Arc::new(FixedClassifier {
            predictions,
            seen: Mutex::new(Vec::new()),
        });
        let coord = coordinator();
        let flusher = ExternalFlusher::new(
            Arc::clone(&coord),
            Some(classifier.clone() as Arc<dyn Classifier>),
            Arc::new(StaticRecommendations::new()),
            0.4,
        );

        let result = flusher.flush_once().await.unwrap();
        assert_eq!(result.len(), 3);

        let events = coord.analytics().snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].predictions, vec!["alpha (66%)", "zeta (80%)"]);

        let seen = classifier.seen.lock();
        assert_eq!(seen[0].1, 0.4);
        assert!(seen[0].0.bpm.starts_with(b"time,value\n"));
    }

    #[tokio::test]
    async fn test_failure_appends_nothing() {
        let coord = coordinator();
        let flusher = ExternalFlusher::new(
            Arc::clone(&coord),
            Some(Arc::new(FailingClassifier)),
            Arc::new(StaticRecommendations::new()),
            DEFAULT_CLASSIFIER_THRESHOLD,
        );
        assert!(matches!(
            flusher.flush_once().await,
            Err(ClassifierError::Status(503))
        ));
        assert!(coord.analytics().is_empty());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let coord = coordinator();
        let flusher = ExternalFlusher::new(
            Arc::clone(&coord),
            None,
            Arc::new(StaticRecommendations::new()),
            DEFAULT_CLASSIFIER_THRESHOLD,
        );
        assert!(matches!(
            flusher.flush_once().await,
            Err(ClassifierError::NotConfigured)
        ));
        assert!(coord.analytics().is_empty());
    }

    #[tokio::test]
    async fn test_empty_predictions_still_logged() {
        let classifier = Arc::new(FixedClassifier {
            predictions: Predictions::new(),
            seen: Mutex::new(Vec::new()),
        });
        let coord = coordinator();
        let flusher = ExternalFlusher::new(
            Arc::clone(&coord),
            Some(classifier),
            Arc::new(StaticRecommendations::new()),
            DEFAULT_CLASSIFIER_THRESHOLD,
        );
        flusher.flush_once().await.unwrap();
        let events = coord.analytics().snapshot();
        assert_eq!(events.len(), 1);
        assert!(events[0].predictions.is_empty());
    }
}
