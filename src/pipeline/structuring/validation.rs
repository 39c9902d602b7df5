// Schema check between the structuring provider's loosely-typed mapping and
// AnnotationRecord. Defaults are filled in first; every violation is reported,
// not just the first one.

use serde_json::{Map, Value};

use crate::models::{AnnotationRecord, Finding, DEFAULT_SUBJECT_ID, GENERATED_BY_PRIMARY};

/// Result of checking one candidate mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(AnnotationRecord),
    Invalid(Vec<String>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }
}

/// Fill optional fields the model left out. Present values are kept, even
/// when they will fail validation.
pub fn apply_defaults(candidate: &mut Value, subject_id: Option<&str>) {
    let Some(obj) = candidate.as_object_mut() else {
        return;
    };
    let subject = subject_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SUBJECT_ID);

    if is_absent(obj, "patient_id") {
        obj.insert("patient_id".into(), Value::String(subject.to_string()));
    }
    if is_absent(obj, "generated_by") {
        obj.insert("generated_by".into(), Value::String(GENERATED_BY_PRIMARY.to_string()));
    }
}

fn is_absent(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), None | Some(Value::Null))
}

/// Check a defaulted candidate against the record schema.
pub fn validate_candidate(candidate: &Value) -> ValidationOutcome {
    let Some(obj) = candidate.as_object() else {
        return ValidationOutcome::Invalid(vec!["candidate is not a JSON object".into()]);
    };
    let mut reasons = Vec::new();

    let subject_id = required_string(obj, "patient_id", &mut reasons);
    let generated_by = required_string(obj, "generated_by", &mut reasons);
    let findings = validate_findings(obj.get("findings"), &mut reasons);
    let confidence = validate_confidence(obj.get("confidence_score"), &mut reasons);

    let notes = match obj.get("additional_notes") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            reasons.push(format!("additional_notes must be a string, got {}", type_name(other)));
            None
        }
    };

    if !reasons.is_empty() {
        return ValidationOutcome::Invalid(reasons);
    }

    match (subject_id, generated_by, findings, confidence) {
        (Some(subject_id), Some(generated_by), Some(findings), Some(confidence)) => {
            match AnnotationRecord::new(subject_id, findings, confidence, generated_by, notes) {
                Ok(record) => ValidationOutcome::Valid(record),
                Err(e) => ValidationOutcome::Invalid(vec![e.to_string()]),
            }
        }
        _ => ValidationOutcome::Invalid(vec!["candidate is incomplete".into()]),
    }
}

fn required_string(obj: &Map<String, Value>, key: &str, reasons: &mut Vec<String>) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            reasons.push(format!("{key} must not be empty"));
            None
        }
        Some(other) => {
            reasons.push(format!("{key} must be a string, got {}", type_name(other)));
            None
        }
        None => {
            reasons.push(format!("{key} is missing"));
            None
        }
    }
}

fn validate_findings(value: Option<&Value>, reasons: &mut Vec<String>) -> Option<Vec<Finding>> {
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(other) => {
            reasons.push(format!("findings must be an array, got {}", type_name(other)));
            return None;
        }
        None => {
            reasons.push("findings is missing".into());
            return None;
        }
    };

    if items.is_empty() {
        reasons.push("findings must contain at least one entry".into());
        return None;
    }

    let before = reasons.len();
    let mut findings = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(entry) = item.as_object() else {
            reasons.push(format!("findings[{i}] must be an object, got {}", type_name(item)));
            continue;
        };
        let label = finding_field(entry, i, "label", true, reasons);
        let location = finding_field(entry, i, "location", true, reasons);
        let severity = finding_field(entry, i, "severity", false, reasons);
        if let (Some(label), Some(location), Some(severity)) = (label, location, severity) {
            findings.push(Finding { label, location, severity });
        }
    }

    (reasons.len() == before).then_some(findings)
}

fn finding_field(
    entry: &Map<String, Value>,
    index: usize,
    key: &str,
    non_empty: bool,
    reasons: &mut Vec<String>,
) -> Option<String> {
    match entry.get(key) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if non_empty && trimmed.is_empty() {
                reasons.push(format!("findings[{index}].{key} must not be empty"));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(other) => {
            reasons.push(format!(
                "findings[{index}].{key} must be a string, got {}",
                type_name(other)
            ));
            None
        }
        None => {
            reasons.push(format!("findings[{index}].{key} is missing"));
            None
        }
    }
}

fn validate_confidence(value: Option<&Value>, reasons: &mut Vec<String>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => Some(c),
            Some(c) => {
                reasons.push(format!("confidence_score {c} is outside [0.0, 1.0]"));
                None
            }
            None => {
                reasons.push("confidence_score is not representable".into());
                None
            }
        },
        Some(other) => {
            reasons.push(format!("confidence_score must be a number, got {}", type_name(other)));
            None
        }
        None => {
            reasons.push("confidence_score is missing".into());
            None
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
