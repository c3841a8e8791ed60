#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # aigrade
//!
//! Command line front end: grade a directory of submissions, grade a single
//! file, or print the response schema.
//!
//! Needs `OPENAI_API_KEY`, either in the environment or in a `.env` file.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use aigrade::{
    BatchInput, BatchRow, Grader, grade_inputs,
    report::{self, flatten},
    request::{MAX_MAX_POINTS, MIN_MAX_POINTS},
    schema::response_schema,
    submission,
};
use anyhow::{Context, Result};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use tracing::{Level, info, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Default file name for the batch table.
const RESULTS_FILE: &str = "grading_results.md";

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade every submission in a directory
    Grade {
        /// Directory holding `.java` / `.zip` submissions
        dir:        PathBuf,
        /// File holding the assignment requirements
        rubric:     PathBuf,
        /// Gradings allowed in flight at once
        threads:    usize,
        /// Points available per submission
        max_points: f64,
        /// Where to write the table; JSON lands next to it
        output:     Option<PathBuf>,
    },
    /// Grade a single file
    GradeOne {
        /// `.java` file or `.zip` archive
        file:       PathBuf,
        /// File holding the assignment requirements
        rubric:     PathBuf,
        /// Points available
        max_points: f64,
        /// Student comment, overriding any sidecar file
        comment:    Option<String>,
        /// Print the raw JSON report instead of text
        json:       bool,
    },
    /// Print the response schema
    Schema,
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the rubric path
    fn rubric() -> impl Parser<PathBuf> {
        positional("RUBRIC").help("Path to the assignment requirements")
    }

    /// parses maximum points
    fn max_points() -> impl Parser<f64> {
        long("max-points")
            .short('p')
            .help("Points available per submission")
            .argument::<f64>("POINTS")
            .guard(
                |p| (MIN_MAX_POINTS..=MAX_MAX_POINTS).contains(p),
                "max points must be between 10 and 200",
            )
            .fallback(100.0)
    }

    let grade = {
        let dir = positional::<PathBuf>("DIR").help("Directory of submissions");
        let rubric = rubric();
        let threads = long("threads")
            .short('t')
            .help("Number of submissions graded at once")
            .argument::<usize>("N")
            .guard(|n| *n >= 1, "threads must be at least 1")
            .fallback(1);
        let max_points = max_points();
        let output = long("output")
            .short('o')
            .help("Path of the results table (default: next to DIR)")
            .argument::<PathBuf>("PATH")
            .optional();
        construct!(Cmd::Grade {
            dir,
            rubric,
            threads,
            max_points,
            output
        })
    }
    .to_options()
    .command("grade")
    .help("Grade every submission in a directory");

    let grade_one = {
        let file = positional::<PathBuf>("FILE").help("A .java file or .zip archive");
        let rubric = rubric();
        let max_points = max_points();
        let comment = long("comment")
            .short('c')
            .help("Student comment to consider")
            .argument::<String>("TEXT")
            .optional();
        let json = long("json").help("Print the report as JSON").switch();
        construct!(Cmd::GradeOne {
            file,
            rubric,
            max_points,
            comment,
            json
        })
    }
    .to_options()
    .command("grade-one")
    .help("Grade a single submission");

    let schema = pure(Cmd::Schema)
        .to_options()
        .command("schema")
        .help("Print the JSON schema grading reports must follow");

    let cmd = construct!([grade, grade_one, schema]);

    cmd.to_options()
        .descr("Grades programming submissions with structured LLM feedback")
        .run()
}

/// Reads the requirements text.
fn read_rubric(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Could not read rubric {}", path.display()))
}

/// Grades a directory and writes the results.
async fn grade_dir(
    dir: &Path,
    rubric: &Path,
    threads: usize,
    max_points: f64,
    output: Option<PathBuf>,
) -> Result<()> {
    let requirements = read_rubric(rubric)?;
    let submissions = submission::discover(dir)?;
    anyhow::ensure!(
        !submissions.is_empty(),
        "No .java or .zip submissions found in {}",
        dir.display()
    );
    info!("found {} submissions in {}", submissions.len(), dir.display());

    let inputs = submissions
        .into_iter()
        .map(|found| match found {
            Ok(s) => BatchInput::Request(s.into_request(&requirements, max_points)),
            Err(failure) => failure.into_batch_input(),
        })
        .collect();

    let grader = Arc::new(Grader::from_config()?);
    let rows = grade_inputs(grader, inputs, threads).await?;

    let output = output.unwrap_or_else(|| {
        dir.parent()
            .unwrap_or_else(|| Path::new("."))
            .join(RESULTS_FILE)
    });
    report::write(&rows, max_points, &output)?;

    eprintln!("{}", report::overview_table(&rows, max_points));
    eprintln!(
        "{} {} (and {})",
        "Results written to".green().bold(),
        output.display(),
        output.with_extension("json").display()
    );
    Ok(())
}

/// Grades a single file and prints the report.
async fn grade_file(
    file: &Path,
    rubric: &Path,
    max_points: f64,
    comment: Option<String>,
    json: bool,
) -> Result<()> {
    let requirements = read_rubric(rubric)?;
    let mut submission = submission::load(file)?;
    if let Some(comment) = comment {
        submission = submission.with_comment(comment);
    }
    let identifier = submission.identifier().to_string();
    let request = submission.into_request(&requirements, max_points);

    let grader = Grader::from_config()?;
    let graded = grader.grade(&request).await?;
    let row = BatchRow::graded(identifier, graded);

    if json {
        let result = row.result().context("graded row without a result")?;
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let flat = flatten(&row, max_points);
    println!("{} {}", "Submission:".bold(), flat.identifier);
    println!("{} {}", "Final score:".bold(), flat.final_score.green().bold());
    if row.needs_review() {
        println!("{}", "Flagged for human review".yellow().bold());
    }
    for (heading, body) in [
        ("Compiles", &flat.compiles),
        ("Runtime", &flat.runtime),
        ("Syntax issues", &flat.syntax_issues),
        ("Logical errors", &flat.logical_errors),
        ("Requirements", &flat.requirements_analysis),
        ("Point deductions", &flat.point_deductions),
        ("Extra credit", &flat.extra_credit),
        ("Code quality", &flat.code_quality),
        ("Overall assessment", &flat.overall_assessment),
        ("Areas for improvement", &flat.areas_for_improvement),
        ("Comment consideration", &flat.comment_consideration),
    ] {
        println!("\n{}\n{body}", heading.cyan().bold());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match options() {
        Cmd::Grade {
            dir,
            rubric,
            threads,
            max_points,
            output,
        } => grade_dir(&dir, &rubric, threads, max_points, output).await?,
        Cmd::GradeOne {
            file,
            rubric,
            max_points,
            comment,
            json,
        } => {
            if let Err(e) = grade_file(&file, &rubric, max_points, comment, json).await {
                eprintln!("{} {e:#}", "Grading failed:".red().bold());
                std::process::exit(1);
            }
        }
        Cmd::Schema => println!("{}", serde_json::to_string_pretty(&response_schema()?)?),
    };

    Ok(())
}
