/// System prompt for radiology image analysis.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert radiologist.";

/// Instruction used when the user gives no focus.
pub const DEFAULT_ANALYSIS_PROMPT: &str = "\
Analyze this medical image and provide:\n\
1. Type of medical imaging (X-ray, CT, MRI, etc.)\n\
2. Anatomical region visible\n\
3. Key findings and observations\n\
4. Any abnormalities or areas of concern\n\
5. Confidence level in your assessment";

/// User message for an analysis request.
pub fn build_analysis_prompt(instruction: Option<&str>) -> String {
    match instruction.map(str::trim) {
        Some(focus) if !focus.is_empty() => {
            format!("Analyze this medical image. Focus on: {focus}")
        }
        _ => DEFAULT_ANALYSIS_PROMPT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_is_embedded() {
        assert_eq!(
            build_analysis_prompt(Some(" lung apices ")),
            "Analyze this medical image. Focus on: lung apices"
        );
    }

    #[test]
    fn missing_or_blank_focus_uses_default() {
        assert_eq!(build_analysis_prompt(None), DEFAULT_ANALYSIS_PROMPT);
        assert_eq!(build_analysis_prompt(Some("   ")), DEFAULT_ANALYSIS_PROMPT);
    }
}
