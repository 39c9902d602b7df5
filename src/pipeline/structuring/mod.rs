pub mod types;
pub mod prompt;
pub mod parser;
pub mod validation;
pub mod fallback;
pub mod ollama;
pub mod gemini;
pub mod structurer;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod mock;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use validation::*;
pub use fallback::*;
pub use ollama::*;
pub use gemini::*;
pub use structurer::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Cannot reach model endpoint at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Model endpoint returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("No API key configured for {0}")]
    MissingApiKey(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

impl StructuringError {
    /// Transport failures come from the path to the model. Everything else is
    /// the model producing output that could not be used.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StructuringError::Connection(_)
                | StructuringError::HttpClient(_)
                | StructuringError::Api { .. }
                | StructuringError::MissingApiKey(_)
        )
    }
}
