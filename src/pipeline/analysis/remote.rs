use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::prompt::build_analysis_prompt;
use super::{non_empty_analysis, AnalysisError, ImageAnalysisProvider};

/// Client for a hosted analysis service exposing `POST /annotate/`.
pub struct RemoteAnalysisClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl RemoteAnalysisClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/annotate/", self.base_url)
    }
}

#[derive(Serialize)]
struct AnnotatePayload<'a> {
    prompt: &'a str,
    img_b64: &'a str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    medgemma_response: Option<String>,
    #[serde(default)]
    msg: Option<serde_json::Value>,
}

fn default_success() -> bool {
    true
}

fn response_text(response: AnnotateResponse) -> Result<String, AnalysisError> {
    if !response.success {
        let reason = match response.msg {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => "no reason given".to_string(),
        };
        return Err(AnalysisError::RemoteRejected(reason));
    }
    let text = response
        .medgemma_response
        .ok_or(AnalysisError::EmptyResponse)?;
    non_empty_analysis(text)
}

impl ImageAnalysisProvider for RemoteAnalysisClient {
    fn analyze(
        &self,
        image_bytes: &[u8],
        instruction: Option<&str>,
    ) -> Result<String, AnalysisError> {
        if image_bytes.is_empty() {
            return Err(AnalysisError::EmptyImage);
        }
        let _span = tracing::info_span!(
            "remote_analysis",
            endpoint = %self.base_url,
            image_size = image_bytes.len(),
        )
        .entered();

        let img_b64 = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let prompt = build_analysis_prompt(instruction);
        let payload = AnnotatePayload {
            prompt: &prompt,
            img_b64: &img_b64,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Remote(format!(
                        "request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    AnalysisError::Remote(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnnotateResponse = response
            .json()
            .map_err(|e| AnalysisError::Remote(format!("invalid response body: {e}")))?;
        let text = response_text(parsed)?;
        tracing::info!(text_len = text.len(), "Remote analysis complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> AnnotateResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = RemoteAnalysisClient::new("http://analysis.local:8000/", 600);
        assert_eq!(client.endpoint(), "http://analysis.local:8000/annotate/");
    }

    #[test]
    fn successful_response_yields_text() {
        let response = parse(json!({"success": true, "medgemma_response": "Left apical pneumothorax."}));
        assert_eq!(response_text(response).unwrap(), "Left apical pneumothorax.");
    }

    #[test]
    fn failure_flag_is_rejected_with_reason() {
        let response = parse(json!({"success": false, "msg": "CUDA out of memory"}));
        match response_text(response) {
            Err(AnalysisError::RemoteRejected(reason)) => assert_eq!(reason, "CUDA out of memory"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_text_is_empty_response() {
        let response = parse(json!({"success": true}));
        assert!(matches!(response_text(response), Err(AnalysisError::EmptyResponse)));
    }

    #[test]
    fn payload_field_names() {
        let value = serde_json::to_value(AnnotatePayload { prompt: "p", img_b64: "aW1n" }).unwrap();
        assert_eq!(value, json!({"prompt": "p", "img_b64": "aW1n"}));
    }

    #[test]
    fn empty_image_rejected_before_network() {
        let client = RemoteAnalysisClient::new("http://127.0.0.1:9", 1);
        assert!(matches!(client.analyze(b"", None), Err(AnalysisError::EmptyImage)));
    }
}
