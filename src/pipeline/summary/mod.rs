//! Clinical summary of a validated record, sized for the description column.
//!
//! Unlike structuring there is no fallback here: a failed or unusable
//! summary call is returned to the caller.

pub mod prompt;
pub mod projector;

pub use prompt::*;
pub use projector::*;

use thiserror::Error;

use crate::pipeline::structuring::StructuringError;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Summary model call failed: {0}")]
    Llm(#[from] StructuringError),

    #[error("Summary failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
