//! Clinical assistant: grounded Q&A about one annotation request.
//!
//! Context comes only from stored data: the final row's clean description,
//! the staged raw analysis, confidence, findings and enhancement report.

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{AnnotationRow, StagedRequest};
use crate::pipeline::structuring::{GenerationOptions, LlmClient, StructuringError};

const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_MAX_OUTPUT_TOKENS: u32 = 2048;

pub const CHAT_SYSTEM_PROMPT: &str = "You are a Clinical Assistant helping medical professionals understand and interpret medical image annotation results. Answer ONLY from the provided context. Do not make assumptions beyond it.";

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("No annotation request with id {0}")]
    NotFound(Uuid),

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Assistant model call failed: {0}")]
    Llm(#[from] StructuringError),

    #[error("Assistant returned an empty answer")]
    EmptyAnswer,
}

// ═══════════════════════════════════════════
// Assistant
// ═══════════════════════════════════════════

pub struct ClinicalAssistant {
    llm: Box<dyn LlmClient + Send + Sync>,
    model_name: String,
}

impl ClinicalAssistant {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
        }
    }

    /// Answer `question` about the request `request_id`.
    pub fn answer(
        &self,
        conn: &Connection,
        request_id: &Uuid,
        question: &str,
    ) -> Result<String, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let request = db::get_staged_request(conn, request_id)?
            .ok_or(ChatError::NotFound(*request_id))?;
        // The final row only speaks for this request if it was promoted from it.
        let final_row = db::get_annotation(conn, &request.dataset, &request.path_url)?
            .filter(|row| row.request_id.as_ref() == Some(request_id));

        let prompt = build_chat_prompt(&request, final_row.as_ref(), question);
        tracing::info!(
            request_id = %request_id,
            finalized = final_row.is_some(),
            prompt_len = prompt.len(),
            "Answering clinical question"
        );

        let options = GenerationOptions {
            system: Some(CHAT_SYSTEM_PROMPT),
            temperature: CHAT_TEMPERATURE,
            max_output_tokens: Some(CHAT_MAX_OUTPUT_TOKENS),
            json: false,
        };
        let answer = self.llm.generate(&self.model_name, &prompt, &options)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ChatError::EmptyAnswer);
        }
        Ok(answer.to_string())
    }
}

// ═══════════════════════════════════════════
// Prompt
// ═══════════════════════════════════════════

pub fn build_chat_prompt(
    request: &StagedRequest,
    final_row: Option<&AnnotationRow>,
    question: &str,
) -> String {
    let record = &request.record;
    let clean_summary = final_row
        .map(|row| row.description.as_str())
        .unwrap_or("Not yet finalized");

    let mut prompt = format!(
        "User's question: {question}\n\n\
         CONTEXT\n\n\
         1. Clean summary (primary source):\n{clean_summary}\n\n\
         2. Raw analysis (for traceability questions):\n{}\n\n\
         3. Confidence score: {:.2} (0.0 to 1.0)\n\n\
         4. Additional context:\n\
         - Image path: {}\n\
         - Validation status: {}\n\
         - Attempts used: {}\n\
         - Number of findings: {}\n",
        request.provenance.raw_analysis_text,
        record.confidence_score(),
        request.path_url,
        request.provenance.status,
        request.provenance.attempt_number,
        record.findings().len(),
    );

    prompt.push_str("\nStructured findings:\n");
    for (i, finding) in record.findings().iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} - Location: {}, Severity: {}\n",
            i + 1,
            finding.label,
            finding.location,
            finding.severity
        ));
    }

    if let Some(report) = record.enhancement().and_then(|e| e.report.as_deref()) {
        prompt.push_str(&format!("\nProfessional report:\n{report}\n"));
    }

    prompt.push_str(
        "\nInstructions:\n\
         - Reference specific findings, locations or confidence scores when relevant.\n\
         - If the question cannot be answered from the context, say so.\n\
         - Prefer the clean summary; use the raw analysis for traceability questions.\n",
    );
    prompt
}
