//! Predict response decoding.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

/// JSON body returned by `POST /predict/`. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_result: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities_result: Option<Vec<f64>>,

    /// Base64 JPEG bytes without a data-URI prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_result: Option<String>,

    /// Server-side failure; takes precedence over every other field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a successful detection produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub ship_count: Option<u64>,
    pub probabilities: Option<Vec<f64>>,
    pub annotated_image: Option<Vec<u8>>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.ship_count.is_none() && self.probabilities.is_none() && self.annotated_image.is_none()
    }
}

impl PredictResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self, DetectionError> {
        serde_json::from_slice(body)
            .map_err(|e| DetectionError::remote(format!("invalid predict response: {}", e)))
    }

    /// Convert into a result, surfacing `error` instead of the data fields.
    pub fn into_result(self) -> Result<DetectionResult, DetectionError> {
        if let Some(error) = self.error {
            return Err(DetectionError::remote(error));
        }
        let annotated_image = self
            .image_result
            .map(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| DetectionError::remote(format!("invalid image_result: {}", e)))
            })
            .transpose()?;
        Ok(DetectionResult {
            ship_count: self.count_result,
            probabilities: self.probabilities_result,
            annotated_image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_fields() {
        let body = br#"{
            "count_result": 3,
            "probabilities_result": [0.91, 0.5, 1.7],
            "image_result": "/9j/2Q=="
        }"#;
        let result = PredictResponse::from_slice(body).unwrap().into_result().unwrap();
        assert_eq!(result.ship_count, Some(3));
        // Values outside 0..1 are passed through untouched.
        assert_eq!(result.probabilities, Some(vec![0.91, 0.5, 1.7]));
        assert_eq!(result.annotated_image, Some(vec![0xff, 0xd8, 0xff, 0xd9]));
    }

    #[test]
    fn error_field_wins_over_data() {
        let body = br#"{"count_result": 2, "error": "model unavailable"}"#;
        let err = PredictResponse::from_slice(body)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!(err, DetectionError::Remote("model unavailable".to_string()));
    }

    #[test]
    fn missing_fields_stay_absent() {
        let result = PredictResponse::from_slice(b"{}")
            .unwrap()
            .into_result()
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn bad_base64_is_a_remote_failure() {
        let err = PredictResponse::from_slice(br#"{"image_result": "data:image/jpeg;base64,AA"}"#)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert!(matches!(err, DetectionError::Remote(msg) if msg.starts_with("invalid image_result")));
    }

    #[test]
    fn negative_count_is_rejected() {
        let err = PredictResponse::from_slice(br#"{"count_result": -1}"#).unwrap_err();
        assert!(!err.is_validation());
    }
}
