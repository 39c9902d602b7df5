use serde_json::Value;

use super::StructuringError;

/// Extract the JSON object from a model response.
///
/// Accepts a bare object, an object inside a ```json (or plain ```) fence,
/// or an object embedded in surrounding prose.
pub fn parse_json_object(response: &str) -> Result<Value, StructuringError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(StructuringError::EmptyResponse);
    }

    let json_str = extract_json_block(trimmed)?;
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| StructuringError::JsonParsing(e.to_string()))?;

    if !value.is_object() {
        return Err(StructuringError::MalformedResponse(
            "Expected a JSON object".into(),
        ));
    }
    Ok(value)
}

fn extract_json_block(response: &str) -> Result<&str, StructuringError> {
    if let Some(fenced) = fenced_block(response) {
        return Ok(fenced);
    }
    if response.starts_with('{') {
        return Ok(response);
    }

    let start = response
        .find('{')
        .ok_or_else(|| StructuringError::MalformedResponse("No JSON object found".into()))?;
    let end = response
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| StructuringError::MalformedResponse("Unclosed JSON object".into()))?;
    Ok(&response[start..=end])
}

fn fenced_block(response: &str) -> Option<&str> {
    let fence_start = response.find("```")?;
    let after_fence = &response[fence_start + 3..];
    // Skip an optional language tag on the opening fence line.
    let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_fence[content_start..];
    let content_end = content.find("```")?;
    let block = content[..content_end].trim();
    if block.is_empty() {
        None
    } else {
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object() {
        let value = parse_json_object(r#"{"confidence_score": 0.9}"#).unwrap();
        assert_eq!(value["confidence_score"], 0.9);
    }

    #[test]
    fn json_fence() {
        let response = "Here you go:\n```json\n{\"findings\": []}\n```\nDone.";
        let value = parse_json_object(response).unwrap();
        assert!(value["findings"].is_array());
    }

    #[test]
    fn plain_fence() {
        let response = "```\n{\"patient_id\": \"P-1\"}\n```";
        assert_eq!(parse_json_object(response).unwrap()["patient_id"], "P-1");
    }

    #[test]
    fn embedded_in_prose() {
        let response = "The result is {\"patient_id\": \"P-2\"} as requested.";
        assert_eq!(parse_json_object(response).unwrap()["patient_id"], "P-2");
    }

    #[test]
    fn empty_response_error() {
        assert!(matches!(parse_json_object("   \n"), Err(StructuringError::EmptyResponse)));
    }

    #[test]
    fn prose_without_json_is_malformed() {
        let err = parse_json_object("The lungs are clear.").unwrap_err();
        assert!(matches!(err, StructuringError::MalformedResponse(_)));
    }

    #[test]
    fn broken_json_is_parse_error() {
        let err = parse_json_object("{\"findings\": [").unwrap_err();
        assert!(matches!(err, StructuringError::JsonParsing(_)));
    }

    #[test]
    fn array_is_not_an_object() {
        let err = parse_json_object("```json\n[1, 2]\n```").unwrap_err();
        assert!(matches!(err, StructuringError::MalformedResponse(_)));
    }
}
