//! # aigrade
//!
//! Grades short programming submissions with a language model. Every
//! submission gets a schema-conforming report and a score that is derived
//! from the report's own deductions, never taken on the model's word.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Grades many submissions concurrently, one output row each
pub mod batch;
/// Environment-driven settings and embedded prompts
pub mod config;
/// Drives the structured → free-form invocation protocol
pub mod coordinator;
/// Error types shared across the pipeline
pub mod error;
/// The single-submission grading pipeline
pub mod grade;
/// Flattened tables and JSON output for graded batches
pub mod report;
/// Builds the payload sent to the model
pub mod request;
/// The grading report and its JSON schema
pub mod schema;
/// Recomputes scores from deductions and extra credit
pub mod score;
/// The model service boundary and its OpenAI implementation
pub mod service;
/// Finds submissions on disk
pub mod submission;
/// Validates raw model output
pub mod validate;

pub use batch::{BatchInput, BatchRow, grade_batch, grade_inputs};
pub use error::GradingError;
pub use grade::{GradedSubmission, Grader};
pub use request::GradingRequest;
pub use schema::GradingResult;
