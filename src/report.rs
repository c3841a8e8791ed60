#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Flattens batch rows into a table and writes it out.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use typed_builder::TypedBuilder;

use crate::{
    batch::BatchRow,
    schema::{GradingResult, RequirementAssessment, SCHEMA_VERSION},
};

/// One flattened output row. Failed submissions keep every column, with only
/// `identifier`, `status` and `error` filled in.
#[derive(Tabled, Serialize, Debug, Clone, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
pub struct ReportRow {
    #[tabled(rename = "Submission")]
    /// Submission identifier.
    pub identifier:            String,
    #[tabled(rename = "Status")]
    /// `graded` or `error`.
    pub status:                String,
    #[tabled(rename = "Final Score")]
    /// `<score>/<max>`.
    pub final_score:           String,
    #[tabled(rename = "Needs Review")]
    /// `yes` when the model's score differed a lot from its itemization.
    pub needs_review:          String,
    #[tabled(rename = "Extra Credit")]
    /// Extra credit with its reason.
    pub extra_credit:          String,
    #[tabled(rename = "Compiles")]
    /// Compilation verdict.
    pub compiles:              String,
    #[tabled(rename = "Runtime")]
    /// Simulated runtime status and narrative.
    pub runtime:               String,
    #[tabled(rename = "Syntax Issues")]
    /// One line per syntax issue.
    pub syntax_issues:         String,
    #[tabled(rename = "Logical Errors")]
    /// One line per logical error.
    pub logical_errors:        String,
    #[tabled(rename = "Code Quality Assessment")]
    /// Code quality assessment.
    pub code_quality:          String,
    #[tabled(rename = "Requirements Analysis")]
    /// Met and unmet requirements.
    pub requirements_analysis: String,
    #[tabled(rename = "Point Deductions")]
    /// One line per deduction.
    pub point_deductions:      String,
    #[tabled(rename = "Overall Assessment")]
    /// Overall assessment.
    pub overall_assessment:    String,
    #[tabled(rename = "Areas for Improvement")]
    /// Suggestions as a bulleted list.
    pub areas_for_improvement: String,
    #[tabled(rename = "Comment Consideration")]
    /// How the student comment was taken into account.
    pub comment_consideration: String,
    #[tabled(rename = "Error")]
    /// Error description for failed submissions.
    pub error:                 String,
}

/// Column headers, in output order.
pub fn headers() -> Vec<String> {
    <ReportRow as Tabled>::headers()
        .into_iter()
        .map(|h| h.to_string())
        .collect()
}

/// Bulleted list, or `empty` when there are no items.
fn bullets<I, S>(items: I, empty: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let lines: Vec<String> = items
        .into_iter()
        .map(|item| format!("- {}", item.as_ref()))
        .collect();
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

/// Groups requirements into met and not met.
pub fn format_requirements(requirements: &[RequirementAssessment]) -> String {
    let (met, unmet): (Vec<_>, Vec<_>) = requirements.iter().partition(|r| r.met);

    let mut sections = Vec::new();
    if !met.is_empty() {
        sections.push(format!(
            "Requirements met:\n{}",
            bullets(met.iter().map(|r| r.requirement.as_str()), "")
        ));
    }
    if !unmet.is_empty() {
        sections.push(format!(
            "Requirements not met:\n{}",
            bullets(
                unmet
                    .iter()
                    .map(|r| format!("{}: {}", r.requirement, r.explanation)),
                ""
            )
        ));
    }
    sections.join("\n\n")
}

/// Renders deductions as `- reason (-points points)`.
pub fn format_deductions(result: &GradingResult) -> String {
    bullets(
        result
            .deductions
            .iter()
            .map(|d| format!("{} (-{} points)", d.reason, d.points)),
        "No points deducted",
    )
}

/// Renders extra credit as `+points points: reason`.
pub fn format_extra_credit(result: &GradingResult) -> String {
    let credit = &result.extra_credit;
    if credit.awarded > 0.0 {
        format!("+{} points: {}", credit.awarded, credit.reason)
    } else {
        "No extra credit awarded".to_string()
    }
}

/// Flattens one batch row.
pub fn flatten(row: &BatchRow, max_points: f64) -> ReportRow {
    let Some(result) = row.result() else {
        return ReportRow::builder()
            .identifier(row.identifier())
            .status("error")
            .error(row.error().unwrap_or_default())
            .build();
    };

    let syntax_issues = bullets(
        result.syntax_issues.iter().map(|issue| match issue.line {
            Some(line) => format!("line {line}: {}", issue.description),
            None => issue.description.clone(),
        }),
        "None",
    );

    ReportRow::builder()
        .identifier(row.identifier())
        .status("graded")
        .final_score(format!("{:.2}/{:.2}", result.final_score, max_points))
        .needs_review(if row.needs_review() { "yes" } else { "no" })
        .extra_credit(format_extra_credit(result))
        .compiles(if result.compilation.will_compile { "yes" } else { "no" })
        .runtime(format!(
            "{}: {}",
            result.runtime_simulation.status, result.runtime_simulation.narrative
        ))
        .syntax_issues(syntax_issues)
        .logical_errors(bullets(&result.logical_errors, "None"))
        .code_quality(result.code_quality.as_str())
        .requirements_analysis(format_requirements(&result.requirement_assessments))
        .point_deductions(format_deductions(result))
        .overall_assessment(result.overall_assessment.as_str())
        .areas_for_improvement(bullets(&result.improvement_suggestions, "None"))
        .comment_consideration(result.comment_consideration.as_str())
        .build()
}

/// Flattens every batch row, keeping their order.
pub fn flatten_all(rows: &[BatchRow], max_points: f64) -> Vec<ReportRow> {
    rows.iter().map(|row| flatten(row, max_points)).collect()
}

impl ReportRow {
    /// Copy of the row whose cells each fit on one Markdown table line:
    /// line breaks become `<br>` and pipes are escaped.
    pub fn to_markdown_cells(&self) -> ReportRow {
        let cell = |text: &str| {
            text.replace('|', "\\|")
                .replace("\r\n", "<br>")
                .replace('\n', "<br>")
        };
        ReportRow {
            identifier:            cell(&self.identifier),
            status:                cell(&self.status),
            final_score:           cell(&self.final_score),
            needs_review:          cell(&self.needs_review),
            extra_credit:          cell(&self.extra_credit),
            compiles:              cell(&self.compiles),
            runtime:               cell(&self.runtime),
            syntax_issues:         cell(&self.syntax_issues),
            logical_errors:        cell(&self.logical_errors),
            code_quality:          cell(&self.code_quality),
            requirements_analysis: cell(&self.requirements_analysis),
            point_deductions:      cell(&self.point_deductions),
            overall_assessment:    cell(&self.overall_assessment),
            areas_for_improvement: cell(&self.areas_for_improvement),
            comment_consideration: cell(&self.comment_consideration),
            error:                 cell(&self.error),
        }
    }
}

/// Markdown table with exactly one line per submission.
pub fn markdown_table(rows: &[ReportRow]) -> String {
    let cells: Vec<ReportRow> = rows.iter().map(ReportRow::to_markdown_cells).collect();
    Table::new(&cells).with(Style::markdown()).to_string()
}

/// Compact overview for the terminal.
pub fn overview_table(rows: &[BatchRow], max_points: f64) -> String {
    /// Terminal-sized subset of a report row.
    #[derive(Tabled)]
    struct Overview<'a> {
        #[tabled(rename = "Submission")]
        /// Submission identifier.
        identifier: &'a str,
        #[tabled(rename = "Score")]
        /// Final score or a dash.
        score:      String,
        #[tabled(rename = "Note")]
        /// Review flag or error.
        note:       String,
    }

    let overview: Vec<Overview> = rows
        .iter()
        .map(|row| Overview {
            identifier: row.identifier(),
            score:      row
                .result()
                .map(|r| format!("{:.2}/{:.2}", r.final_score, max_points))
                .unwrap_or_else(|| "-".into()),
            note:       match (row.error(), row.needs_review()) {
                (Some(err), _) => err.to_string(),
                (None, true) => "needs review".into(),
                (None, false) => String::new(),
            },
        })
        .collect();

    let failed = rows.iter().filter(|r| r.error().is_some()).count();

    Table::new(&overview)
        .with(Panel::header("Grading Overview"))
        .with(Panel::footer(format!(
            "Graded: {}, Failed: {failed}",
            rows.len() - failed
        )))
        .with(Modify::new(Rows::new(1..)).with(Width::wrap(48).keep_words(true)))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(
            Modify::new(Rows::last())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

/// JSON document written next to the table.
#[derive(Serialize)]
struct BatchDocument<'a> {
    /// Version of the grading result shape.
    schema_version: &'a str,
    /// Points available per submission.
    max_points:     f64,
    /// One entry per submission.
    rows:           &'a [BatchRow],
}

/// Serializes the batch rows as pretty JSON.
pub fn to_json(rows: &[BatchRow], max_points: f64) -> Result<String> {
    serde_json::to_string_pretty(&BatchDocument {
        schema_version: SCHEMA_VERSION,
        max_points,
        rows,
    })
    .context("Failed to serialize grading results")
}

/// Writes the Markdown table to `table_path` and the JSON document next to it
/// (same stem, `.json` extension).
pub fn write(rows: &[BatchRow], max_points: f64, table_path: &Path) -> Result<()> {
    let table = markdown_table(&flatten_all(rows, max_points));
    fs::write(table_path, table)
        .with_context(|| format!("Could not write {}", table_path.display()))?;

    let json_path = table_path.with_extension("json");
    fs::write(&json_path, to_json(rows, max_points)?)
        .with_context(|| format!("Could not write {}", json_path.display()))?;
    Ok(())
}
