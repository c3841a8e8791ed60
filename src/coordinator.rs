#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Obtains one validated [`GradingResult`] for one payload.
//!
//! The protocol is a small state machine. Structured mode is tried first; a
//! transport failure or malformed reply moves to free-form mode, which is
//! tried exactly once. A refusal from either mode ends the attempt at once.
//! At most two external calls are made per payload.

use tracing::{info, warn};

use crate::{
    error::{GradingError, ValidationError},
    request::RequestPayload,
    schema::GradingResult,
    service::ModelService,
    validate::{validate_structured, validate_text},
};

/// Which invocation mode produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Structured-output mode.
    Structured,
    /// Free-form fallback mode.
    Fallback,
}

impl std::fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationMode::Structured => f.write_str("structured"),
            InvocationMode::Fallback => f.write_str("fallback"),
        }
    }
}

/// A validated result together with the mode that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The validated, not yet rescored, result.
    pub result: GradingResult,
    /// The mode that produced it.
    pub mode:   InvocationMode,
}

/// Protocol states.
enum Stage {
    /// Nothing has been called yet.
    Start,
    /// Structured mode failed in a retryable way.
    PrimaryAttempted {
        /// Why structured mode failed.
        cause: String,
    },
    /// Free-form mode has been called; no further calls are allowed.
    SecondaryAttempted {
        /// Why structured mode failed.
        primary_cause: String,
        /// What free-form mode produced.
        outcome:       Result<GradingResult, SecondaryFailure>,
    },
    /// Final outcome.
    Terminal(Result<Invocation, GradingError>),
}

/// Ways the free-form attempt can end without a result.
enum SecondaryFailure {
    /// The model declined in its free-text answer.
    Refused(String),
    /// Transport failure or unusable text.
    Failed(String),
}

/// Drives a [`ModelService`] through the structured → free-form protocol.
pub struct Coordinator<M> {
    /// The model service being coordinated.
    service: M,
}

impl<M: ModelService> Coordinator<M> {
    /// Wraps `service`.
    pub fn new(service: M) -> Self {
        Self { service }
    }

    /// Returns the wrapped service.
    pub fn service(&self) -> &M {
        &self.service
    }

    /// Runs the protocol for `payload`.
    pub async fn invoke(&self, payload: &RequestPayload) -> Result<Invocation, GradingError> {
        let id = payload.identifier();
        let mut stage = Stage::Start;

        loop {
            stage = match stage {
                Stage::Start => match self.service.structured(payload).await {
                    Ok(reply) => match validate_structured(reply) {
                        Ok(result) => Stage::Terminal(Ok(Invocation {
                            result,
                            mode: InvocationMode::Structured,
                        })),
                        Err(ValidationError::Refusal(reason)) => {
                            warn!(identifier = id, "model refused in structured mode");
                            Stage::Terminal(Err(GradingError::Refused(reason)))
                        }
                        Err(ValidationError::Malformed(reason)) => {
                            warn!(identifier = id, %reason, "structured reply malformed, falling back");
                            Stage::PrimaryAttempted {
                                cause: format!("structured reply malformed: {reason}"),
                            }
                        }
                    },
                    Err(err) => {
                        warn!(identifier = id, error = %err, "structured call failed, falling back");
                        Stage::PrimaryAttempted {
                            cause: format!("structured call failed: {err}"),
                        }
                    }
                },
                Stage::PrimaryAttempted { cause } => {
                    let outcome = match self.service.freeform(payload).await {
                        Ok(text) => validate_text(&text).map_err(|err| match err {
                            ValidationError::Refusal(reason) => SecondaryFailure::Refused(reason),
                            ValidationError::Malformed(reason) => SecondaryFailure::Failed(
                                format!("fallback reply malformed: {reason}"),
                            ),
                        }),
                        Err(err) => Err(SecondaryFailure::Failed(format!(
                            "fallback call failed: {err}"
                        ))),
                    };
                    Stage::SecondaryAttempted {
                        primary_cause: cause,
                        outcome,
                    }
                }
                Stage::SecondaryAttempted {
                    primary_cause,
                    outcome,
                } => match outcome {
                    Ok(result) => Stage::Terminal(Ok(Invocation {
                        result,
                        mode: InvocationMode::Fallback,
                    })),
                    Err(SecondaryFailure::Refused(reason)) => {
                        warn!(identifier = id, "model refused in fallback mode");
                        Stage::Terminal(Err(GradingError::Refused(reason)))
                    }
                    Err(SecondaryFailure::Failed(secondary_cause)) => {
                        warn!(identifier = id, %primary_cause, %secondary_cause, "both invocation modes failed");
                        Stage::Terminal(Err(GradingError::GradingUnavailable {
                            cause: format!("{primary_cause}; {secondary_cause}"),
                        }))
                    }
                },
                Stage::Terminal(outcome) => {
                    if let Ok(invocation) = &outcome {
                        info!(identifier = id, mode = %invocation.mode, "grading result validated");
                    }
                    break outcome;
                }
            };
        }
    }
}
