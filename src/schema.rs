#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The shape of a grading report.
//!
//! These types are the wire contract with the model service: the JSON schema
//! derived from [`GradingResult`] is what the structured-output mode is
//! constrained to, and what the fallback prompt asks for. Changing a field
//! here is a breaking change, so bump [`SCHEMA_VERSION`] with it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version of the grading result shape.
pub const SCHEMA_VERSION: &str = "1";

/// Name under which the schema is registered with the model service.
pub const SCHEMA_NAME: &str = "grading_result_v1";

/// A syntax problem spotted in the submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyntaxIssue {
    /// 1-based line number of the problem, or null when it has no single line.
    pub line:        Option<u32>,
    /// What is wrong.
    pub description: String,
}

/// Whether the submission would compile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Compilation {
    /// True if the code would compile as submitted.
    pub will_compile: bool,
    /// Compiler-style error messages, empty when it compiles.
    pub errors:       Vec<String>,
}

/// Outcome of the simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    /// The program behaves as required.
    Pass,
    /// The program misbehaves or crashes.
    Fail,
    /// Behaviour cannot be judged from the source alone.
    Uncertain,
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeStatus::Pass => "pass",
            RuntimeStatus::Fail => "fail",
            RuntimeStatus::Uncertain => "uncertain",
        };
        f.write_str(s)
    }
}

/// Model-judged runtime behaviour. Nothing is actually executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeSimulation {
    /// Overall verdict of the simulated run.
    pub status:    RuntimeStatus,
    /// Walkthrough of the simulated run with the inputs considered.
    pub narrative: String,
}

/// Verdict on one requirement taken from the rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequirementAssessment {
    /// The requirement as stated in the rubric.
    pub requirement: String,
    /// True only if the requirement is fully met.
    pub met:         bool,
    /// Why it is (or is not, or only partially) met.
    pub explanation: String,
}

/// A named, point-valued reduction from the maximum score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Deduction {
    /// Why points were taken off.
    pub reason: String,
    /// Points removed, never negative.
    #[schemars(range(min = 0.0))]
    pub points: f64,
}

/// Extra credit for work that clearly goes beyond the requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtraCredit {
    /// Points awarded, 0 when none.
    #[schemars(range(min = 0.0))]
    pub awarded: f64,
    /// Why extra credit was (or was not) awarded.
    pub reason:  String,
}

/// The full grading report for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GradingResult {
    /// Syntax problems in source order.
    pub syntax_issues:           Vec<SyntaxIssue>,
    /// Compilation verdict.
    pub compilation:             Compilation,
    /// Logical errors in the implementation.
    pub logical_errors:          Vec<String>,
    /// Simulated runtime behaviour.
    pub runtime_simulation:      RuntimeSimulation,
    /// One entry per requirement in the rubric.
    pub requirement_assessments: Vec<RequirementAssessment>,
    /// Assessment of readability, organisation and style.
    pub code_quality:            String,
    /// Every reduction applied to the maximum score.
    pub deductions:              Vec<Deduction>,
    /// Extra credit, if any.
    pub extra_credit:            ExtraCredit,
    /// Maximum points minus deductions plus extra credit, within [0, maximum].
    pub final_score:             f64,
    /// Summary of the submission, highlighting what went well.
    pub overall_assessment:      String,
    /// Most important next steps for the student.
    pub improvement_suggestions: Vec<String>,
    /// How the student's comment affected grading, or empty if there was none.
    pub comment_consideration:   String,
}

impl GradingResult {
    /// Sum of all deduction points.
    pub fn total_deductions(&self) -> f64 {
        self.deductions.iter().map(|d| d.points).sum()
    }

    /// Checks the numeric ranges and reason invariants serde cannot express.
    ///
    /// Does not look at `final_score` beyond requiring a finite number; its
    /// range is re-derived by the score calculator.
    pub fn check(&self) -> Result<(), String> {
        for (i, issue) in self.syntax_issues.iter().enumerate() {
            if issue.line == Some(0) {
                return Err(format!("syntax_issues[{i}].line must be 1 or greater"));
            }
        }

        for (i, deduction) in self.deductions.iter().enumerate() {
            if !deduction.points.is_finite() || deduction.points < 0.0 {
                return Err(format!(
                    "deductions[{i}].points must be a non-negative number, got {}",
                    deduction.points
                ));
            }
            if deduction.reason.trim().is_empty() {
                return Err(format!("deductions[{i}].reason must not be empty"));
            }
        }

        let credit = &self.extra_credit;
        if !credit.awarded.is_finite() || credit.awarded < 0.0 {
            return Err(format!(
                "extra_credit.awarded must be a non-negative number, got {}",
                credit.awarded
            ));
        }
        if credit.awarded > 0.0 && credit.reason.trim().is_empty() {
            return Err("extra_credit.reason must explain awarded points".into());
        }

        if !self.final_score.is_finite() {
            return Err("final_score must be a finite number".into());
        }

        Ok(())
    }
}

/// JSON schema for [`GradingResult`] in the form structured-output mode
/// accepts: fully inlined, every property required, no extra properties.
pub fn response_schema() -> Result<Value, serde_json::Error> {
    let settings = schemars::r#gen::SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.option_add_null_type = true;
    });
    let root = settings
        .into_generator()
        .into_root_schema_for::<GradingResult>();

    let mut value = serde_json::to_value(root)?;
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
    }
    strictify(&mut value);
    Ok(value)
}

/// Walks a schema and closes every object: all properties required,
/// `additionalProperties: false`, and no `format` hints.
fn strictify(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("format");
            close_object(map);
            for child in map.values_mut() {
                strictify(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strictify),
        _ => {}
    }
}

/// Marks every property of an object schema as required.
fn close_object(map: &mut Map<String, Value>) {
    let Some(Value::Object(properties)) = map.get("properties") else {
        return;
    };
    let required: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
    map.insert("required".into(), Value::Array(required));
    map.insert("additionalProperties".into(), Value::Bool(false));
}
