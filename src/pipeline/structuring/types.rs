use serde_json::Value;

use super::prompt::InstructionVariant;
use super::StructuringError;

/// Per-call generation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions<'a> {
    pub system: Option<&'a str>,
    /// Sampling temperature. Structuring uses a low value for reproducible output.
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    /// Ask the backend for a bare JSON response where it supports that.
    pub json: bool,
}

impl Default for GenerationOptions<'_> {
    fn default() -> Self {
        Self {
            system: None,
            temperature: 0.1,
            max_output_tokens: None,
            json: false,
        }
    }
}

/// Text-generation backend.
pub trait LlmClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions<'_>,
    ) -> Result<String, StructuringError>;
}

/// Vision-capable chat backend (image + instruction in, text out).
pub trait VisionClient: Send + Sync {
    fn chat_with_images(
        &self,
        model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, StructuringError>;
}

/// One call to the structuring provider.
#[derive(Debug, Clone, Copy)]
pub struct StructuringRequest<'a> {
    pub raw_text: &'a str,
    pub subject_id: Option<&'a str>,
    /// Free-text focus the user gave for the image analysis.
    pub user_instruction: Option<&'a str>,
    /// 1-based attempt index.
    pub attempt: u32,
    pub variant: InstructionVariant,
}

/// Turns raw analysis text into a loosely-typed candidate mapping.
///
/// Errors cover both transport problems and unusable output; callers that
/// care can tell them apart with [`StructuringError::is_transport`].
pub trait StructuringProvider {
    fn structure(&self, request: &StructuringRequest<'_>) -> Result<Value, StructuringError>;
}
