//! One-shot "recognize whole file" adapter.
//!
//! The simpler alternative to the streaming protocol: a single multipart
//! upload of the completed container, one synchronous transcript back, no
//! incremental updates. Retry policy belongs to the caller; this adapter
//! makes exactly one attempt and reports upward.

use crate::audio::wav::WavContainer;
use crate::config::RecognitionConfig;
use crate::error::{Result, VocapError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    text: String,
}

/// Client for the batch "recognize file" endpoint.
pub struct BatchRecognizer {
    client: reqwest::Client,
    endpoint: String,
    appkey: String,
    token: String,
}

impl BatchRecognizer {
    /// Build an adapter from the recognition config.
    ///
    /// # Errors
    /// Returns `VocapError::Recognition` when no batch endpoint is
    /// configured.
    pub fn new(config: &RecognitionConfig) -> Result<Self> {
        if config.batch_endpoint.is_empty() {
            return Err(VocapError::Recognition {
                message: "no batch endpoint configured".to_string(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.batch_endpoint.clone(),
            appkey: config.appkey.clone(),
            token: config.token.clone(),
        })
    }

    /// Upload one container and return the recognized text.
    ///
    /// # Errors
    /// Returns `VocapError::Recognition` carrying the upstream message on
    /// any HTTP or decoding failure. Single attempt, no retry.
    pub async fn recognize(&self, container: &WavContainer) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(container.as_bytes().to_vec())
            .file_name("capture.wav")
            .mime_str("audio/wav")
            .map_err(|e| VocapError::Recognition {
                message: format!("failed to build upload part: {}", e),
            })?;
        let form = reqwest::multipart::Form::new()
            .text("appkey", self.appkey.clone())
            .part("audio", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VocapError::Recognition {
                message: format!("upload failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VocapError::Recognition {
                message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }

        let decoded: RecognizeResponse =
            response.json().await.map_err(|e| VocapError::Recognition {
                message: format!("malformed response: {}", e),
            })?;
        tracing::debug!(chars = decoded.text.len(), "batch recognition returned");
        Ok(decoded.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_a_batch_endpoint() {
        let config = RecognitionConfig::default();
        match BatchRecognizer::new(&config) {
            Err(VocapError::Recognition { message }) => {
                assert!(message.contains("batch endpoint"));
            }
            other => panic!("expected Recognition error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn new_accepts_a_configured_endpoint() {
        let config = RecognitionConfig {
            batch_endpoint: "http://127.0.0.1:8080/recognize".to_string(),
            ..Default::default()
        };
        assert!(BatchRecognizer::new(&config).is_ok());
    }

    #[tokio::test]
    async fn recognize_reports_connection_failure_upward() {
        let config = RecognitionConfig {
            batch_endpoint: "http://127.0.0.1:9/recognize".to_string(),
            ..Default::default()
        };
        let recognizer = BatchRecognizer::new(&config).unwrap();

        let mut buffer = crate::audio::wav::FrameBuffer::new();
        buffer.append(&crate::audio::frame::AudioFrame::new(0, vec![0u8; 320]));
        let container = buffer.build(16000, 1, 16).unwrap();

        match recognizer.recognize(&container).await {
            Err(VocapError::Recognition { message }) => {
                assert!(message.contains("upload failed"));
            }
            other => panic!("expected Recognition error, got {:?}", other),
        }
    }
}
