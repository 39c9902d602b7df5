use serde_json::Value;

use super::parser::parse_json_object;
use super::prompt::{build_structuring_prompt, STRUCTURING_SYSTEM_PROMPT};
use super::types::{GenerationOptions, LlmClient, StructuringProvider, StructuringRequest};
use super::StructuringError;

/// Structuring temperature: low for reproducible JSON.
const STRUCTURING_TEMPERATURE: f32 = 0.1;

/// StructuringProvider backed by any text LLM.
pub struct LlmStructurer {
    llm: Box<dyn LlmClient + Send + Sync>,
    model_name: String,
}

impl LlmStructurer {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl StructuringProvider for LlmStructurer {
    fn structure(&self, request: &StructuringRequest<'_>) -> Result<Value, StructuringError> {
        let prompt = build_structuring_prompt(request);
        let options = GenerationOptions {
            system: Some(STRUCTURING_SYSTEM_PROMPT),
            temperature: STRUCTURING_TEMPERATURE,
            max_output_tokens: None,
            json: true,
        };

        let response = self.llm.generate(&self.model_name, &prompt, &options)?;
        tracing::debug!(
            attempt = request.attempt,
            response_len = response.len(),
            "Structuring response received"
        );
        parse_json_object(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::mock::{MockLlmClient, RecordingLlmClient};
    use crate::pipeline::structuring::prompt::{variant_for_attempt, InstructionVariant};

    fn request(attempt: u32) -> StructuringRequest<'static> {
        StructuringRequest {
            raw_text: "Right rib fracture.",
            subject_id: None,
            user_instruction: None,
            attempt,
            variant: variant_for_attempt(attempt),
        }
    }

    #[test]
    fn parses_fenced_model_output() {
        let llm = MockLlmClient::new("```json\n{\"confidence_score\": 0.7}\n```");
        let structurer = LlmStructurer::new(Box::new(llm), "gemini-2.0-flash");
        let value = structurer.structure(&request(1)).unwrap();
        assert_eq!(value["confidence_score"], 0.7);
    }

    #[test]
    fn prose_output_is_an_error() {
        let llm = MockLlmClient::new("I could not find anything.");
        let structurer = LlmStructurer::new(Box::new(llm), "m");
        assert!(structurer.structure(&request(1)).is_err());
    }

    #[test]
    fn sends_attempt_specific_prompt_in_json_mode() {
        let llm = RecordingLlmClient::new("{}");
        let prompts = llm.prompts();
        let structurer = LlmStructurer::new(Box::new(llm), "m");
        structurer.structure(&request(1)).unwrap();
        structurer.structure(&request(2)).unwrap();

        let seen = prompts.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].prompt.contains("RETRY"));
        assert!(seen[1].prompt.contains("RETRY (attempt 2)"));
        assert!(seen.iter().all(|call| call.json));
        assert_eq!(request(2).variant, InstructionVariant::Strict);
    }
}
