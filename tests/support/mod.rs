//! Shared helpers for the integration tests: a scripted model service and a
//! few canned grading results.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use aigrade::{
    GradingRequest,
    config::GradingPrompts,
    error::ServiceError,
    grade::Grader,
    request::RequestPayload,
    schema::{
        Compilation, Deduction, ExtraCredit, GradingResult, RequirementAssessment,
        RuntimeSimulation, RuntimeStatus,
    },
    service::{ModelService, StructuredReply},
};

pub const WELL_FORMED: &str = include_str!("../../fixtures/responses/well_formed.json");
pub const FENCED_REPLY: &str = include_str!("../../fixtures/responses/fenced_reply.txt");
pub const RUBRIC: &str = include_str!("../../fixtures/rubrics/average.md");

/// What the structured call does.
#[derive(Debug, Clone)]
pub enum Structured {
    /// Return this text as schema-constrained content.
    Content(String),
    /// Return an explicit refusal.
    Refuse(String),
    /// Fail at the transport level.
    Fail,
}

/// What the free-form call does.
#[derive(Debug, Clone)]
pub enum Freeform {
    /// Return this text.
    Text(String),
    /// Fail at the transport level.
    Fail,
}

/// Behaviour for one submission.
#[derive(Debug, Clone)]
pub struct Script {
    pub structured: Structured,
    pub freeform:   Freeform,
    pub delay:      Duration,
}

impl Script {
    pub fn structured(content: impl Into<String>) -> Self {
        Self {
            structured: Structured::Content(content.into()),
            freeform:   Freeform::Fail,
            delay:      Duration::ZERO,
        }
    }

    pub fn refuse(reason: &str) -> Self {
        Self {
            structured: Structured::Refuse(reason.to_string()),
            freeform:   Freeform::Fail,
            delay:      Duration::ZERO,
        }
    }

    pub fn then_freeform(mut self, freeform: Freeform) -> Self {
        self.freeform = freeform;
        self
    }

    pub fn failing() -> Self {
        Self {
            structured: Structured::Fail,
            freeform:   Freeform::Fail,
            delay:      Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A [`ModelService`] that answers from per-identifier scripts and counts
/// every call it receives.
pub struct ScriptedService {
    scripts:          HashMap<String, Script>,
    fallback:         Script,
    structured_calls: AtomicUsize,
    freeform_calls:   AtomicUsize,
    in_flight:        AtomicUsize,
    max_in_flight:    AtomicUsize,
}

impl ScriptedService {
    /// Every submission gets `script`.
    pub fn uniform(script: Script) -> Self {
        Self::with_scripts(script, [])
    }

    /// Submissions named in `scripts` get their own behaviour, the rest get
    /// `fallback`.
    pub fn with_scripts(
        fallback: Script,
        scripts: impl IntoIterator<Item = (&'static str, Script)>,
    ) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(id, s)| (id.to_string(), s))
                .collect(),
            fallback,
            structured_calls: AtomicUsize::new(0),
            freeform_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn freeform_calls(&self) -> usize {
        self.freeform_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.structured_calls() + self.freeform_calls()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn script_for(&self, payload: &RequestPayload) -> Script {
        self.scripts
            .get(payload.identifier())
            .unwrap_or(&self.fallback)
            .clone()
    }

    async fn hold(&self, delay: Duration) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ModelService for ScriptedService {
    async fn structured(&self, payload: &RequestPayload) -> Result<StructuredReply, ServiceError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(payload);
        self.hold(script.delay).await;

        match script.structured {
            Structured::Content(text) => Ok(StructuredReply::Content(text)),
            Structured::Refuse(reason) => Ok(StructuredReply::Refusal(reason)),
            Structured::Fail => Err(ServiceError::Transport("connection reset".into())),
        }
    }

    async fn freeform(&self, payload: &RequestPayload) -> Result<String, ServiceError> {
        self.freeform_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(payload);
        self.hold(script.delay).await;

        match script.freeform {
            Freeform::Text(text) => Ok(text),
            Freeform::Fail => Err(ServiceError::Timeout(Duration::from_secs(180))),
        }
    }
}

pub fn grader(service: ScriptedService) -> Grader<ScriptedService> {
    Grader::new(service, GradingPrompts::load())
}

pub fn request(identifier: &str) -> GradingRequest {
    GradingRequest::builder()
        .identifier(identifier)
        .source_code("public class Main { public static void main(String[] a) {} }")
        .requirements_text(RUBRIC)
        .max_points(100.0)
        .build()
}

/// A valid result with the given deductions, extra credit and proposed score.
pub fn result_with(deductions: &[(&str, f64)], extra: f64, final_score: f64) -> GradingResult {
    GradingResult {
        syntax_issues:           vec![],
        compilation:             Compilation {
            will_compile: true,
            errors:       vec![],
        },
        logical_errors:          vec![],
        runtime_simulation:      RuntimeSimulation {
            status:    RuntimeStatus::Pass,
            narrative: "Prints the expected output.".into(),
        },
        requirement_assessments: vec![RequirementAssessment {
            requirement: "Print the sum".into(),
            met:         true,
            explanation: "The sum is printed.".into(),
        }],
        code_quality:            "Clear.".into(),
        deductions:              deductions
            .iter()
            .map(|(reason, points)| Deduction {
                reason: reason.to_string(),
                points: *points,
            })
            .collect(),
        extra_credit:            ExtraCredit {
            awarded: extra,
            reason:  if extra > 0.0 {
                "Handles invalid input".into()
            } else {
                String::new()
            },
        },
        final_score,
        overall_assessment:      "Good work.".into(),
        improvement_suggestions: vec!["Add comments".into()],
        comment_consideration:   String::new(),
    }
}

pub fn to_json(result: &GradingResult) -> String {
    serde_json::to_string(result).expect("serialize result")
}
