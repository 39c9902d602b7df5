//! Image analysis: image bytes in, free-text radiology analysis out.

pub mod prompt;
pub mod vision;
pub mod remote;

pub use prompt::*;
pub use vision::*;
pub use remote::*;

use thiserror::Error;

use crate::pipeline::structuring::StructuringError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Image is empty")]
    EmptyImage,

    #[error("Analysis model returned no text")]
    EmptyResponse,

    #[error("Vision model error: {0}")]
    Vision(#[from] StructuringError),

    #[error("Analysis service unreachable: {0}")]
    Remote(String),

    #[error("Analysis service returned error (status {status}): {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("Analysis service rejected the request: {0}")]
    RemoteRejected(String),
}

/// Produces raw natural-language analysis for one image.
pub trait ImageAnalysisProvider {
    fn analyze(
        &self,
        image_bytes: &[u8],
        instruction: Option<&str>,
    ) -> Result<String, AnalysisError>;
}

/// Reject empty model output; return the trimmed text otherwise.
pub(crate) fn non_empty_analysis(text: String) -> Result<String, AnalysisError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    if trimmed.len() == text.len() {
        Ok(text)
    } else {
        Ok(trimmed.to_string())
    }
}
