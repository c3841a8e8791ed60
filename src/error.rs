#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

use async_openai::error::OpenAIError;
use thiserror::Error;

/// Everything that can go wrong while grading one submission or a batch.
///
/// The messages are meant to be read by instructors, so each variant keeps
/// "the model declined" apart from "the service could not be reached" and
/// "the response could not be understood".
#[derive(Debug, Error)]
pub enum GradingError {
    /// The caller supplied empty or out-of-range input. Never retried.
    #[error("Invalid grading request: {0}")]
    InvalidRequest(String),
    /// The model explicitly declined to grade the submission.
    #[error("The model declined to grade this submission: {0}")]
    Refused(String),
    /// The model replied, but the reply did not match the grading schema.
    #[error("The model response could not be understood: {0}")]
    MalformedOutput(String),
    /// Neither invocation mode produced a usable result.
    #[error("The grading service could not produce a result: {cause}")]
    GradingUnavailable {
        /// What went wrong on each attempt.
        cause: String,
    },
    /// Two submissions in one batch share an identifier.
    #[error("Duplicate submission identifier in batch: `{0}`")]
    DuplicateIdentifier(String),
    /// A batch was started without any submissions.
    #[error("The batch contains no submissions")]
    EmptyBatch,
    /// A batch was started with a concurrency limit below one.
    #[error("Concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),
    /// Something inside the grader broke; not the caller's input and not the
    /// model's reply.
    #[error("Internal grading failure: {0}")]
    Internal(String),
}

impl GradingError {
    /// Stable, machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            GradingError::InvalidRequest(_) => "invalid_request",
            GradingError::Refused(_) => "refused",
            GradingError::MalformedOutput(_) => "malformed_output",
            GradingError::GradingUnavailable { .. } => "grading_unavailable",
            GradingError::DuplicateIdentifier(_) => "duplicate_identifier",
            GradingError::EmptyBatch => "empty_batch",
            GradingError::InvalidConcurrency(_) => "invalid_concurrency",
            GradingError::Internal(_) => "internal_error",
        }
    }
}

/// Classified failure produced by the response validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The model declined to grade.
    #[error("refusal: {0}")]
    Refusal(String),
    /// The output does not conform to the grading schema.
    #[error("malformed output: {0}")]
    Malformed(String),
}

impl From<ValidationError> for GradingError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Refusal(reason) => GradingError::Refused(reason),
            ValidationError::Malformed(reason) => GradingError::MalformedOutput(reason),
        }
    }
}

/// Failure to get any reply out of the model service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The OpenAI client reported an error (network, HTTP status, API error).
    #[error("OpenAI request failed: {0}")]
    OpenAi(#[from] OpenAIError),
    /// The call did not finish within the configured deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The service answered without any choices to read.
    #[error("The service returned an empty response")]
    EmptyResponse,
    /// Any other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}
