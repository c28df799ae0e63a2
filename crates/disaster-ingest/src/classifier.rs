//! Image classification capability used by detection requests.

use async_trait::async_trait;
use disaster_types::DisasterType;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Label and confidence assigned to an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "type")]
    pub disaster_type: DisasterType,
    pub confidence: f64,
}

/// Pluggable image classifier.
///
/// `image_url` is `None` when a detection request only names a region.
#[async_trait]
pub trait DisasterClassifier: Send + Sync {
    async fn classify(&self, image_url: Option<&str>) -> Result<Prediction, IngestError>;
}

/// Classifier that returns a fixed prediction.
///
/// The default answers flood at 0.95 for every input.
pub struct MockClassifier {
    prediction: Prediction,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            prediction: Prediction {
                disaster_type: DisasterType::Flood,
                confidence: 0.95,
            },
        }
    }

    pub fn with_prediction(disaster_type: DisasterType, confidence: f64) -> Self {
        Self {
            prediction: Prediction {
                disaster_type,
                confidence,
            },
        }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisasterClassifier for MockClassifier {
    async fn classify(&self, _image_url: Option<&str>) -> Result<Prediction, IngestError> {
        Ok(self.prediction.clone())
    }
}
