#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The single-submission pipeline: build, invoke, validate, score.

use anyhow::Result;
use tracing::{Instrument, info_span};

use crate::{
    config::{self, GradingPrompts},
    coordinator::{Coordinator, InvocationMode},
    error::GradingError,
    request::{GradingRequest, build_payload, validate_max_points},
    schema::GradingResult,
    score::{self, ScoreDiscrepancy, ScoredResult},
    service::{ModelService, OpenAiService},
};

/// A finished grading for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedSubmission {
    /// The scored report.
    pub result:      GradingResult,
    /// Set when the model's proposed score was overridden.
    pub discrepancy: Option<ScoreDiscrepancy>,
    /// Which invocation mode produced the report.
    pub mode:        InvocationMode,
}

/// Grades submissions one at a time against a model service.
pub struct Grader<M> {
    /// Protocol driver wrapping the model service.
    coordinator: Coordinator<M>,
    /// Prompt assets used to build payloads.
    prompts:     GradingPrompts,
}

impl<M: ModelService> Grader<M> {
    /// Creates a grader around `service`.
    pub fn new(service: M, prompts: GradingPrompts) -> Self {
        Self {
            coordinator: Coordinator::new(service),
            prompts,
        }
    }

    /// Returns the coordinator.
    pub fn coordinator(&self) -> &Coordinator<M> {
        &self.coordinator
    }

    /// Grades one submission.
    ///
    /// Input problems are rejected before any external call is made.
    pub async fn grade(&self, request: &GradingRequest) -> Result<GradedSubmission, GradingError> {
        let span = info_span!("grade", identifier = request.identifier());
        async {
            let max_points = validate_max_points(request.max_points())?;
            let payload = build_payload(request, &self.prompts)?;
            let invocation = self.coordinator.invoke(&payload).await?;
            let ScoredResult {
                result,
                discrepancy,
            } = score::apply(invocation.result, max_points);

            Ok(GradedSubmission {
                result,
                discrepancy,
                mode: invocation.mode,
            })
        }
        .instrument(span)
        .await
    }
}

impl Grader<OpenAiService> {
    /// Creates a grader backed by the configured OpenAI endpoint.
    pub fn from_config() -> Result<Self> {
        let env = config::openai_config()?;
        let service = OpenAiService::new(env, config::http_client()?, config::request_timeout()?);
        Ok(Self::new(service, config::prompts()?))
    }
}
