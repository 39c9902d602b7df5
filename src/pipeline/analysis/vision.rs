use std::sync::Arc;

use base64::Engine as _;

use super::prompt::{build_analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use super::{non_empty_analysis, AnalysisError, ImageAnalysisProvider};
use crate::pipeline::structuring::types::VisionClient;

/// Image analysis through a local vision model (MedGemma on Ollama).
///
/// Accepts any `VisionClient` implementation (OllamaClient or mock).
pub struct OllamaVisionAnalyzer {
    vision_client: Arc<dyn VisionClient>,
    model_name: String,
}

impl OllamaVisionAnalyzer {
    pub fn new(vision_client: Arc<dyn VisionClient>, model_name: String) -> Self {
        Self {
            vision_client,
            model_name,
        }
    }
}

impl ImageAnalysisProvider for OllamaVisionAnalyzer {
    fn analyze(
        &self,
        image_bytes: &[u8],
        instruction: Option<&str>,
    ) -> Result<String, AnalysisError> {
        if image_bytes.is_empty() {
            return Err(AnalysisError::EmptyImage);
        }
        let _span = tracing::info_span!(
            "image_analysis",
            model = %self.model_name,
            image_size = image_bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let images = vec![base64::engine::general_purpose::STANDARD.encode(image_bytes)];
        let prompt = build_analysis_prompt(instruction);

        let raw = self.vision_client.chat_with_images(
            &self.model_name,
            &prompt,
            &images,
            Some(ANALYSIS_SYSTEM_PROMPT),
        )?;
        let text = non_empty_analysis(raw)?;

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            "Image analysis complete"
        );
        Ok(text)
    }
}
