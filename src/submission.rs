#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Finds submissions in a directory and turns them into grading requests.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glob::glob;
use itertools::Itertools;
use tracing::warn;
use zip::ZipArchive;

use crate::{batch::BatchInput, request::GradingRequest};

/// Extension of source files that are graded.
pub const SOURCE_EXTENSION: &str = "java";

/// Extension of archives whose source files are graded.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Suffix of the optional file holding a student's comment.
pub const COMMENT_SUFFIX: &str = ".comment.txt";

/// One source file within a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFile {
    /// File name as submitted.
    pub file_name: String,
    /// File contents.
    pub content:   String,
}

/// A student's submission: one `.java` file or every `.java` file in a zip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Identifier derived from the file name.
    identifier: String,
    /// Source files.
    files:      Vec<SubmissionFile>,
    /// Optional comment from the sidecar file.
    comment:    Option<String>,
    /// Where the submission was found.
    path:       PathBuf,
}

impl Submission {
    /// Returns the identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the source files.
    pub fn files(&self) -> &[SubmissionFile] {
        &self.files
    }

    /// Returns the student comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns the submission path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the student comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// All files rendered as one block of source text.
    pub fn source_code(&self) -> String {
        self.files
            .iter()
            .map(|f| format!("File name: {}\n{}", f.file_name, f.content))
            .join("\n\n")
    }

    /// Builds a request grading this submission against `requirements`.
    pub fn into_request(self, requirements: &str, max_points: f64) -> GradingRequest {
        GradingRequest::builder()
            .identifier(self.identifier.clone())
            .source_code(self.source_code())
            .requirements_text(requirements)
            .maybe_student_comment(self.comment)
            .max_points(max_points)
            .build()
    }
}

/// A submission found on disk that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    /// Identifier derived from the file name.
    pub identifier: String,
    /// Where the submission was found.
    pub path:       PathBuf,
    /// Why it could not be loaded.
    pub reason:     String,
}

impl LoadFailure {
    /// Batch entry that records this failure as the submission's error row.
    pub fn into_batch_input(self) -> BatchInput {
        BatchInput::Rejected {
            identifier: self.identifier,
            reason:     self.reason,
        }
    }
}

/// Derives the identifier from a submission path: the file stem with
/// underscores turned into spaces, so `John_Smith.zip` becomes `John Smith`.
pub fn identifier_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace('_', " ").trim().to_string())
        .unwrap_or_default()
}

/// Loads a single submission from a `.java` file or a `.zip` archive.
pub fn load(path: &Path) -> Result<Submission> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let files = match extension.as_str() {
        SOURCE_EXTENSION => vec![read_source_file(path)?],
        ARCHIVE_EXTENSION => read_archive(path)?,
        other => anyhow::bail!(
            "{} is not a .{SOURCE_EXTENSION} or .{ARCHIVE_EXTENSION} file (found `.{other}`)",
            path.display()
        ),
    };

    Ok(Submission {
        identifier: identifier_for(path),
        files,
        comment: read_comment(path),
        path: path.to_path_buf(),
    })
}

/// Finds every submission at the top level of `dir`, sorted by path.
///
/// Files that cannot be loaded are logged and kept as [`LoadFailure`]s in
/// their sorted position.
pub fn discover(dir: &Path) -> Result<Vec<Result<Submission, LoadFailure>>> {
    anyhow::ensure!(dir.is_dir(), "{} is not a valid directory", dir.display());

    let mut paths = Vec::new();
    for extension in [SOURCE_EXTENSION, ARCHIVE_EXTENSION] {
        let pattern = dir.join(format!("*.{extension}"));
        let pattern = pattern
            .to_str()
            .context("Could not convert submissions directory to string")?;
        paths.extend(
            glob(pattern)
                .context("Could not create glob")?
                .filter_map(Result::ok)
                .filter(|p| p.is_file()),
        );
    }
    paths.sort();

    let submissions = paths
        .into_iter()
        .map(|path| {
            load(&path).map_err(|err| {
                warn!("Error processing {}: {err:#}", path.display());
                LoadFailure {
                    identifier: identifier_for(&path),
                    reason:     format!("{err:#}"),
                    path,
                }
            })
        })
        .collect();

    Ok(submissions)
}

/// Decodes source bytes, replacing invalid UTF-8 with U+FFFD.
fn decode_source(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Reads one source file.
fn read_source_file(path: &Path) -> Result<SubmissionFile> {
    let bytes = fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    let content = decode_source(&bytes);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(SubmissionFile { file_name, content })
}

/// Reads every `.java` entry from a zip archive.
fn read_archive(path: &Path) -> Result<Vec<SubmissionFile>> {
    let file =
        fs::File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive {}", path.display()))?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry {i} in {}", path.display()))?;
        if entry.is_dir() || !entry.name().ends_with(&format!(".{SOURCE_EXTENSION}")) {
            continue;
        }

        let file_name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {file_name} in {}", path.display()))?;
        files.push(SubmissionFile {
            file_name,
            content: decode_source(&bytes),
        });
    }

    anyhow::ensure!(
        !files.is_empty(),
        "{} contains no .{SOURCE_EXTENSION} files",
        path.display()
    );
    Ok(files)
}

/// Reads the sidecar comment next to `path`, if one exists.
fn read_comment(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let sidecar = path.with_file_name(format!("{stem}{COMMENT_SUFFIX}"));
    let comment = fs::read_to_string(sidecar).ok()?;
    let comment = comment.trim();
    (!comment.is_empty()).then(|| comment.to_string())
}
