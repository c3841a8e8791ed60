#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turns a submission and its rubric into the payload sent to the model.

use async_openai::{
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs,
    },
};
use bon::Builder;
use serde_json::Value;

use crate::{
    config::GradingPrompts,
    error::GradingError,
    schema::{self, SCHEMA_NAME},
};

/// Smallest maximum-points value a request may carry.
pub const MIN_MAX_POINTS: f64 = 10.0;

/// Largest maximum-points value a request may carry.
pub const MAX_MAX_POINTS: f64 = 200.0;

/// Checks that `max_points` lies within [`MIN_MAX_POINTS`, `MAX_MAX_POINTS`].
pub fn validate_max_points(max_points: f64) -> Result<f64, GradingError> {
    if (MIN_MAX_POINTS..=MAX_MAX_POINTS).contains(&max_points) {
        Ok(max_points)
    } else {
        Err(GradingError::InvalidRequest(format!(
            "max_points must be between {MIN_MAX_POINTS} and {MAX_MAX_POINTS}, got {max_points}"
        )))
    }
}

/// Everything needed to grade one submission.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct GradingRequest {
    /// Correlation key, unique within a batch.
    identifier:        String,
    /// The submitted source code.
    source_code:       String,
    /// The rubric / assignment guidelines.
    requirements_text: String,
    /// Optional note the student left with the submission.
    student_comment:   Option<String>,
    /// Points available for the assignment.
    max_points:        f64,
}

impl GradingRequest {
    /// Returns the identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the submitted source code.
    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    /// Returns the rubric text.
    pub fn requirements_text(&self) -> &str {
        &self.requirements_text
    }

    /// Returns the student comment, if any.
    pub fn student_comment(&self) -> Option<&str> {
        self.student_comment.as_deref()
    }

    /// Returns the maximum points.
    pub fn max_points(&self) -> f64 {
        self.max_points
    }
}

/// The opaque bundle handed to the model service for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPayload {
    /// Identifier of the submission, used for logging only.
    identifier:      String,
    /// Grading policy.
    system_message:  String,
    /// Rubric, source, comment and maximum points.
    user_message:    String,
    /// Formatting instructions used only by the free-form fallback.
    fallback_format: String,
    /// Schema the reply must follow.
    schema:          Value,
    /// Points available for the assignment.
    max_points:      f64,
}

impl RequestPayload {
    /// Returns the submission identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the grading policy.
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    /// Returns the user message carrying rubric, source and comment.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Returns the user message with explicit formatting instructions
    /// appended, for the free-form fallback.
    pub fn fallback_user_message(&self) -> String {
        format!("{}\n\n{}", self.user_message, self.fallback_format)
    }

    /// Returns the target schema.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns the schema name registered with the service.
    pub fn schema_name(&self) -> &str {
        SCHEMA_NAME
    }

    /// Returns the maximum points.
    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    /// Chat messages for structured-output mode.
    pub fn messages(&self) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        self.compose(self.user_message.clone())
    }

    /// Chat messages for free-form mode.
    pub fn fallback_messages(&self) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        self.compose(self.fallback_user_message())
    }

    /// Pairs the grading policy with a user message.
    fn compose(&self, user: String) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_message.clone())
                .name("Instructor".to_string())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .name("Student".to_string())
                .build()?
                .into(),
        ])
    }
}

/// Builds the payload for `request`.
///
/// Pure: the same request and prompts always produce the same payload.
/// `max_points` is expected to be validated already.
pub fn build_payload(
    request: &GradingRequest,
    prompts: &GradingPrompts,
) -> Result<RequestPayload, GradingError> {
    if request.source_code.trim().is_empty() {
        return Err(GradingError::InvalidRequest(format!(
            "submission `{}` has no source code",
            request.identifier
        )));
    }
    if request.requirements_text.trim().is_empty() {
        return Err(GradingError::InvalidRequest(
            "requirements text must not be empty".into(),
        ));
    }

    let comment = request
        .student_comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("No comment provided.");

    let user_message = format!(
        "## Assignment Guidelines\n\n{guidelines}\n\n## Student's Code\n\n```java\n{code}\n```\n\n\
         ## Student's Comment\n\n{comment}\n\n## Maximum Points\n\n{max_points}\n\nPlease grade \
         the above code based on the given assignment guidelines and provide a comprehensive \
         grading result.",
        guidelines = request.requirements_text.trim(),
        code = request.source_code,
        max_points = request.max_points,
    );

    let schema = schema::response_schema()
        .map_err(|e| GradingError::Internal(format!("could not build grading schema: {e}")))?;
    let rendered_schema = serde_json::to_string_pretty(&schema)
        .map_err(|e| GradingError::Internal(format!("could not render grading schema: {e}")))?;

    Ok(RequestPayload {
        identifier: request.identifier.clone(),
        system_message: prompts.system_policy().to_string(),
        user_message,
        fallback_format: prompts.fallback_format(&rendered_schema),
        schema,
        max_points: request.max_points,
    })
}
