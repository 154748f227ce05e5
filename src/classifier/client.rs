use super::types::{parse_predictions, Classifier, ClassifierError, ClassifierResult, Predictions};
use crate::streaming::CsvExport;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 60;

/// Classifier reached over HTTP with a multipart `bpm`/`uterus` upload
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ClassifierResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn csv_part(bytes: Vec<u8>, file_name: &'static str) -> ClassifierResult<Part> {
        Ok(Part::bytes(bytes).file_name(file_name).mime_str("text/csv")?)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn predict(&self, export: CsvExport, threshold: f64) -> ClassifierResult<Predictions> {
        let form = Form::new()
            .part("bpm", Self::csv_part(export.bpm, "bpm.csv")?)
            .part("uterus", Self::csv_part(export.uterus, "uterus.csv")?);

        debug!("Posting buffers to classifier at {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .query(&[("threshold", threshold)])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Classifier response is not JSON, treating as no predictions: {}", e);
                return Ok(Predictions::new());
            }
        };

        let predictions = parse_predictions(&body);
        if predictions.is_empty() {
            warn!("Classifier response carried no usable predictions");
        }
        Ok(predictions)
    }
}
