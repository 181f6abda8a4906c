//! Remote inference call.
//!
//! One multipart `POST /predict/`, one JSON response. There is no retry,
//! timeout or cancellation policy: the call either resolves or fails.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use url::Url;

use crate::multipart::MultipartBody;
use crate::options::DetectionOption;
use crate::response::PredictResponse;
use crate::upload::Upload;

pub const PREDICT_PATH: &str = "/predict/";
pub const FILE_FIELD: &str = "file";
pub const OPTIONS_FIELD: &str = "options";

const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Something that can run a detection request.
///
/// Implementations return `Err` for transport-level failures and for
/// non-success statuses. A decoded body carrying `error` is returned as-is;
/// the caller decides how to surface it.
pub trait InferenceService {
    fn predict(&self, upload: &Upload, options: &[DetectionOption]) -> Result<PredictResponse>;
}

impl<T: InferenceService + ?Sized> InferenceService for &T {
    fn predict(&self, upload: &Upload, options: &[DetectionOption]) -> Result<PredictResponse> {
        (**self).predict(upload, options)
    }
}

/// Build the multipart body for a predict request.
pub fn encode_predict_request(upload: &Upload, options: &[DetectionOption]) -> (String, Vec<u8>) {
    let mut body = MultipartBody::new();
    body.add_file(
        FILE_FIELD,
        upload.filename(),
        upload.mime_type(),
        upload.bytes(),
    );
    for option in options {
        body.add_text(OPTIONS_FIELD, option.wire_label());
    }
    body.finish()
}

/// Join the predict path onto a service base URL.
pub fn predict_url(endpoint: &str) -> Result<Url> {
    let mut base = Url::parse(endpoint).with_context(|| format!("parse endpoint '{}'", endpoint))?;
    match base.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "unsupported endpoint scheme '{}'; expected http(s)",
                other
            ))
        }
    }
    if base.path().ends_with(PREDICT_PATH) {
        return Ok(base);
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(PREDICT_PATH.trim_start_matches('/'))
        .context("build predict url")
}

/// HTTP client for the inference service.
pub struct HttpInferenceClient {
    url: Url,
    agent: ureq::Agent,
}

impl HttpInferenceClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            url: predict_url(endpoint)?,
            agent: ureq::AgentBuilder::new().build(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl InferenceService for HttpInferenceClient {
    fn predict(&self, upload: &Upload, options: &[DetectionOption]) -> Result<PredictResponse> {
        let (content_type, body) = encode_predict_request(upload, options);
        log::debug!(
            "POST {} ({} bytes, {} options)",
            self.url,
            body.len(),
            options.len()
        );
        let response = match self
            .agent
            .post(self.url.as_str())
            .set("Content-Type", &content_type)
            .set("Accept", "application/json")
            .send_bytes(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = read_body(response).unwrap_or_default();
                return Err(anyhow!(status_failure_message(code, &body)));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(anyhow!("{}", transport));
            }
        };
        let status = response.status();
        let body = read_body(response)?;
        log::debug!("predict responded {} ({} bytes)", status, body.len());
        serde_json::from_slice(&body).map_err(|e| anyhow!("invalid predict response: {}", e))
    }
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES + 1)
        .read_to_end(&mut bytes)
        .context("read predict response")?;
    if bytes.len() as u64 > MAX_RESPONSE_BYTES {
        return Err(anyhow!("predict response exceeds {} bytes", MAX_RESPONSE_BYTES));
    }
    Ok(bytes)
}

/// Message for a non-success status, preferring text the server supplied.
pub fn status_failure_message(code: u16, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["error", "detail"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                if !text.trim().is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    format!("inference service responded with status {}", code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::parse_form_data;

    #[test]
    fn predict_url_appends_path_once() {
        assert_eq!(
            predict_url("http://localhost:8000").unwrap().as_str(),
            "http://localhost:8000/predict/"
        );
        assert_eq!(
            predict_url("https://api.example.com/v1").unwrap().as_str(),
            "https://api.example.com/v1/predict/"
        );
        assert_eq!(
            predict_url("http://10.0.0.2:8000/predict/").unwrap().as_str(),
            "http://10.0.0.2:8000/predict/"
        );
        assert!(predict_url("ftp://example.com").is_err());
        assert!(predict_url("not a url").is_err());
    }

    #[test]
    fn request_carries_file_and_selected_options() {
        let upload = Upload::new(vec![7, 7, 7], "pass.png", "image/png").unwrap();
        let (content_type, body) = encode_predict_request(
            &upload,
            &[DetectionOption::ShipCount, DetectionOption::ProcessedImage],
        );
        let parts = parse_form_data(&content_type, &body).unwrap();
        let files: Vec<_> = parts.iter().filter(|p| p.name == FILE_FIELD).collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename.as_deref(), Some("pass.png"));
        assert_eq!(files[0].data, vec![7, 7, 7]);
        let options: Vec<_> = parts
            .iter()
            .filter(|p| p.name == OPTIONS_FIELD)
            .filter_map(|p| p.text())
            .collect();
        assert_eq!(options, vec!["Número de Barcos", "Imagen con Detecciones"]);
    }

    #[test]
    fn status_message_prefers_server_text() {
        assert_eq!(
            status_failure_message(500, br#"{"error":"CUDA out of memory"}"#),
            "CUDA out of memory"
        );
        assert_eq!(
            status_failure_message(422, br#"{"detail":"file required"}"#),
            "file required"
        );
        assert_eq!(
            status_failure_message(502, b"<html>bad gateway</html>"),
            "inference service responded with status 502"
        );
    }
}
