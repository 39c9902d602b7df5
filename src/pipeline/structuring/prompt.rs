use super::types::StructuringRequest;

pub const STRUCTURING_SYSTEM_PROMPT: &str = r#"
You are a medical data validator. Your ONLY role is to convert a radiology
model's free-text image analysis into one JSON object. You restate what the
analysis says; you do not add findings that are not in it.
"#;

/// Shape of the object the structuring model must return.
pub const RECORD_SCHEMA: &str = r#"{
  "patient_id": "string",
  "findings": [
    {"label": "string", "location": "string", "severity": "string"}
  ],
  "confidence_score": "number between 0.0 and 1.0",
  "additional_notes": "string (optional)"
}
Required: patient_id, findings (at least one item), confidence_score."#;

/// Instruction text used for a structuring attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionVariant {
    /// First attempt: full extraction guidance.
    Baseline,
    /// Later attempts: restates every type constraint after a rejected answer.
    Strict,
}

/// Instruction variants indexed by attempt (1-based). Attempts past the end
/// of the table reuse the last entry.
pub const INSTRUCTION_TABLE: &[InstructionVariant] =
    &[InstructionVariant::Baseline, InstructionVariant::Strict];

/// Pick the instruction variant for a 1-based attempt number.
pub fn variant_for_attempt(attempt: u32) -> InstructionVariant {
    let index = (attempt.max(1) - 1) as usize;
    INSTRUCTION_TABLE
        .get(index)
        .or_else(|| INSTRUCTION_TABLE.last())
        .copied()
        .unwrap_or(InstructionVariant::Baseline)
}

/// Build the structuring prompt for one attempt.
pub fn build_structuring_prompt(request: &StructuringRequest<'_>) -> String {
    match request.variant {
        InstructionVariant::Baseline => baseline_prompt(request),
        InstructionVariant::Strict => strict_prompt(request),
    }
}

fn focus_line(request: &StructuringRequest<'_>) -> String {
    match request.user_instruction {
        Some(focus) if !focus.trim().is_empty() => {
            format!("ANALYSIS FOCUS REQUESTED BY THE USER: {}\n\n", focus.trim())
        }
        _ => String::new(),
    }
}

fn baseline_prompt(request: &StructuringRequest<'_>) -> String {
    let subject = request.subject_id.unwrap_or("AUTO-GENERATED");
    format!(
        r#"Convert this image analysis into structured JSON.

SCHEMA REQUIREMENTS:
{RECORD_SCHEMA}

<analysis>
{raw}
</analysis>

PATIENT ID: {subject}

{focus}INSTRUCTIONS:
1. Extract ALL medical findings mentioned in the analysis.
2. For each finding, provide:
   - label: the condition or finding (e.g. "Pneumothorax", "Normal", "Fracture")
   - location: anatomical location (e.g. "Right lung apex", "Left femur", "Overall")
   - severity: one of "Severe", "Moderate", "Mild", "None"
3. Estimate confidence_score (0.0-1.0) from the clarity of the analysis, the
   presence of hedging language ("possible", "likely") and the number of findings.
4. Put any important context not captured in findings into additional_notes.
5. If NO abnormalities are found, return ONE finding:
   label "Normal", location "Overall", severity "None".

CRITICAL RULES:
- confidence_score MUST be a number between 0.0 and 1.0
- findings MUST NOT be empty
- keep every string field concise

Return ONLY valid JSON matching the schema. No markdown, no code fences, no explanations."#,
        raw = request.raw_text,
        focus = focus_line(request),
    )
}

fn strict_prompt(request: &StructuringRequest<'_>) -> String {
    let subject = request.subject_id.unwrap_or("UNKNOWN");
    format!(
        r#"RETRY (attempt {attempt}): the previous answer failed validation.

Be EXTRA careful with data types and required fields:
- confidence_score MUST be a NUMBER between 0.0 and 1.0, NOT a string
- every finding MUST have "label", "location" and "severity" as non-empty STRINGS
- patient_id MUST be a STRING
- findings MUST be an ARRAY with at least 1 item

<analysis>
{raw}
</analysis>

PATIENT ID: {subject}

{focus}SCHEMA (follow exactly):
{RECORD_SCHEMA}

Double-check before answering:
- confidence_score is a number, not "0.85"
- findings has at least one item
- each finding has all three fields

Return ONLY valid JSON. No markdown, no explanations."#,
        attempt = request.attempt,
        raw = request.raw_text,
        focus = focus_line(request),
    )
}
