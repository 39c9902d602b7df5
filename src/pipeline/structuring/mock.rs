//! Test doubles for the model-facing traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::prompt::InstructionVariant;
use super::types::{
    GenerationOptions, LlmClient, StructuringProvider, StructuringRequest, VisionClient,
};
use super::StructuringError;

/// LLM client that always returns the same response.
pub struct MockLlmClient {
    response: String,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &GenerationOptions<'_>,
    ) -> Result<String, StructuringError> {
        Ok(self.response.clone())
    }
}

/// LLM client that is never reachable.
pub struct UnreachableLlmClient {
    pub calls: Arc<AtomicUsize>,
}

impl UnreachableLlmClient {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LlmClient for UnreachableLlmClient {
    fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &GenerationOptions<'_>,
    ) -> Result<String, StructuringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StructuringError::Connection("http://localhost:11434".into()))
    }
}

/// LLM client that replays responses in order, repeating the last one.
pub struct SequenceLlmClient {
    responses: Vec<String>,
    pub calls: Arc<AtomicUsize>,
}

impl SequenceLlmClient {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: responses.iter().map(|s| s.to_string()).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LlmClient for SequenceLlmClient {
    fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _options: &GenerationOptions<'_>,
    ) -> Result<String, StructuringError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = n.min(self.responses.len().saturating_sub(1));
        self.responses
            .get(index)
            .cloned()
            .ok_or(StructuringError::EmptyResponse)
    }
}

/// One recorded `generate` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub json: bool,
}

/// LLM client that records every call and returns a fixed response.
pub struct RecordingLlmClient {
    response: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }
}

impl LlmClient for RecordingLlmClient {
    fn generate(
        &self,
        _model: &str,
        prompt: &str,
        options: &GenerationOptions<'_>,
    ) -> Result<String, StructuringError> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_string(),
            system: options.system.map(str::to_string),
            temperature: options.temperature,
            json: options.json,
        });
        Ok(self.response.clone())
    }
}

/// Scripted outcome of one structuring call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Candidate(Value),
    ParseFailure,
    TransportFailure,
}

/// Structuring provider that plays a script, repeating the last entry, and
/// records the attempt index and instruction variant of every call.
pub struct ScriptedProvider {
    script: Vec<Scripted>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(u32, InstructionVariant)>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: Scripted) -> Self {
        Self::new(vec![outcome])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StructuringProvider for ScriptedProvider {
    fn structure(&self, request: &StructuringRequest<'_>) -> Result<Value, StructuringError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((request.attempt, request.variant));

        let index = n.min(self.script.len().saturating_sub(1));
        match self.script.get(index) {
            Some(Scripted::Candidate(value)) => Ok(value.clone()),
            Some(Scripted::ParseFailure) => {
                Err(StructuringError::JsonParsing("expected value at line 1".into()))
            }
            Some(Scripted::TransportFailure) | None => {
                Err(StructuringError::Connection("https://generativelanguage.googleapis.com".into()))
            }
        }
    }
}

/// Vision client returning a fixed analysis and recording the prompts.
pub struct MockVisionClient {
    response: Result<String, String>,
    pub calls: Mutex<Vec<(String, Option<String>, usize)>>,
}

impl MockVisionClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl VisionClient for MockVisionClient {
    fn chat_with_images(
        &self,
        _model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, StructuringError> {
        self.calls.lock().unwrap().push((
            user_prompt.to_string(),
            system.map(str::to_string),
            images.len(),
        ));
        self.response
            .clone()
            .map_err(StructuringError::HttpClient)
    }
}
