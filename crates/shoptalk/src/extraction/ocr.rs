//! OCR boundary. Accuracy is the recognizer's problem, not ours: the engine
//! hands over a binary buffer plus tuning options and gets raw text back.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Tuning applied to every recognition request. The whitelist and single-block
/// segmentation keep the recognizer from inventing punctuation inside
/// tabular purchase-order lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOptions {
    pub char_whitelist: String,
    pub page_seg_mode: String,
    pub denoise: bool,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            char_whitelist:
                "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz .,-$".to_string(),
            page_seg_mode: "single_block".to_string(),
            denoise: true,
        }
    }
}

/// Text extraction from an image buffer. Implementations must be shareable
/// across concurrent upload handlers.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8], mime_type: &str) -> Result<String>;
}

/// HTTP client for a remote OCR service. Sends the raw buffer with the
/// declared content type; tuning options travel as query parameters.
pub struct HttpOcrClient {
    endpoint: String,
    options: OcrOptions,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    text: String,
}

impl HttpOcrClient {
    pub fn new(endpoint: impl Into<String>, options: OcrOptions) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            options,
            client,
        })
    }
}

#[async_trait]
impl TextRecognizer for HttpOcrClient {
    async fn recognize(&self, image: &[u8], mime_type: &str) -> Result<String> {
        tracing::debug!(
            endpoint = %self.endpoint,
            mime_type = %mime_type,
            bytes = image.len(),
            psm = %self.options.page_seg_mode,
            "Sending OCR request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("whitelist", self.options.char_whitelist.as_str()),
                ("psm", self.options.page_seg_mode.as_str()),
                ("denoise", if self.options.denoise { "1" } else { "0" }),
            ])
            .header("Content-Type", mime_type)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("OCR request to {} timed out", self.endpoint)
                } else {
                    anyhow!("OCR request to {} failed: {}", self.endpoint, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(anyhow!("OCR service error (HTTP {}): {}", status, preview));
        }

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("OCR service returned invalid JSON: {}", e))?;

        Ok(parsed.text)
    }
}
