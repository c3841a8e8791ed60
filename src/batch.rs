#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runs the grading pipeline over many submissions at once.
//!
//! Each submission runs in its own task, gated by a semaphore with one permit
//! per allowed in-flight grading. A failure anywhere in one submission's
//! pipeline becomes that submission's error row and never touches its
//! siblings. Rows come back in input order, one per submission.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::join_all;
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    error::GradingError,
    grade::{GradedSubmission, Grader},
    request::GradingRequest,
    schema::GradingResult,
    score::ScoreDiscrepancy,
    service::ModelService,
};

/// One output record per submission.
///
/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRow {
    /// Submission identifier.
    identifier: String,
    /// The scored report, when grading succeeded.
    result:     Option<GradingResult>,
    /// `<kind>: <message>` when grading failed.
    error:      Option<String>,
    /// Score override details, when the model's score was corrected.
    review:     Option<ScoreDiscrepancy>,
}

impl BatchRow {
    /// Row for a successful grading.
    pub fn graded(identifier: impl Into<String>, graded: GradedSubmission) -> Self {
        Self {
            identifier: identifier.into(),
            result:     Some(graded.result),
            error:      None,
            review:     graded.discrepancy,
        }
    }

    /// Row for a failed grading.
    pub fn failed(identifier: impl Into<String>, err: &GradingError) -> Self {
        Self {
            identifier: identifier.into(),
            result:     None,
            error:      Some(format!("{}: {err}", err.kind())),
            review:     None,
        }
    }

    /// Returns the submission identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the report, if grading succeeded.
    pub fn result(&self) -> Option<&GradingResult> {
        self.result.as_ref()
    }

    /// Returns the error description, if grading failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the score override details, if any.
    pub fn review(&self) -> Option<&ScoreDiscrepancy> {
        self.review.as_ref()
    }

    /// Whether the row was flagged for a human look.
    pub fn needs_review(&self) -> bool {
        self.review.is_some_and(|r| r.needs_review)
    }
}

/// One entry handed to the orchestrator.
#[derive(Debug, Clone)]
pub enum BatchInput {
    /// A submission ready to grade.
    Request(GradingRequest),
    /// A submission that could not be turned into a request. It still gets
    /// an error row, in its place, without any external call.
    Rejected {
        /// Submission identifier.
        identifier: String,
        /// Why no request could be built.
        reason:     String,
    },
}

impl BatchInput {
    /// Returns the submission identifier.
    pub fn identifier(&self) -> &str {
        match self {
            BatchInput::Request(request) => request.identifier(),
            BatchInput::Rejected { identifier, .. } => identifier,
        }
    }
}

impl From<GradingRequest> for BatchInput {
    fn from(request: GradingRequest) -> Self {
        BatchInput::Request(request)
    }
}

/// Checks the preconditions the orchestrator owns.
fn check_batch(inputs: &[BatchInput], concurrency: usize) -> Result<(), GradingError> {
    if concurrency < 1 {
        return Err(GradingError::InvalidConcurrency(concurrency));
    }
    if inputs.is_empty() {
        return Err(GradingError::EmptyBatch);
    }

    let mut seen = HashSet::with_capacity(inputs.len());
    for input in inputs {
        if !seen.insert(input.identifier()) {
            return Err(GradingError::DuplicateIdentifier(
                input.identifier().to_string(),
            ));
        }
    }
    Ok(())
}

/// Where one submission's row will come from.
enum Slot {
    /// Already decided without grading.
    Ready(BatchRow),
    /// Being graded by a spawned task.
    Running {
        /// Submission identifier, for the row if the task dies.
        identifier: String,
        /// The grading task.
        task:       JoinHandle<BatchRow>,
    },
}

impl Slot {
    /// Waits for the slot's row.
    async fn into_row(self) -> BatchRow {
        match self {
            Slot::Ready(row) => row,
            Slot::Running { identifier, task } => match task.await {
                Ok(row) => row,
                Err(join_err) => {
                    warn!(identifier = %identifier, error = %join_err, "grading task aborted");
                    BatchRow::failed(identifier, &GradingError::Internal(join_err.to_string()))
                }
            },
        }
    }
}

/// Grades every request with at most `concurrency` gradings in flight.
///
/// Fails only for an empty batch, `concurrency < 1` or a repeated
/// identifier, and then before any external call is made. Otherwise returns
/// exactly one row per request, in the order of `requests`.
pub async fn grade_batch<M>(
    grader: Arc<Grader<M>>,
    requests: Vec<GradingRequest>,
    concurrency: usize,
) -> Result<Vec<BatchRow>, GradingError>
where
    M: ModelService + 'static,
{
    let inputs = requests.into_iter().map(BatchInput::from).collect();
    grade_inputs(grader, inputs, concurrency).await
}

/// Like [`grade_batch`], but rejected inputs are accepted too and become
/// `invalid_request` rows in their position.
pub async fn grade_inputs<M>(
    grader: Arc<Grader<M>>,
    inputs: Vec<BatchInput>,
    concurrency: usize,
) -> Result<Vec<BatchRow>, GradingError>
where
    M: ModelService + 'static,
{
    check_batch(&inputs, concurrency)?;

    let total = inputs.len();
    let span = info_span!("batch", batch_id = %Uuid::new_v4(), total, concurrency);
    let permits = Arc::new(Semaphore::new(concurrency));
    let finished = Arc::new(AtomicUsize::new(0));

    async move {
        info!("grading {total} submissions with up to {concurrency} at a time");

        let mut slots = Vec::with_capacity(total);
        for input in inputs {
            let request = match input {
                BatchInput::Request(request) => request,
                BatchInput::Rejected { identifier, reason } => {
                    warn!(identifier = %identifier, %reason, "submission rejected before grading");
                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    info!("graded {done}/{total}");
                    slots.push(Slot::Ready(BatchRow::failed(
                        identifier,
                        &GradingError::InvalidRequest(reason),
                    )));
                    continue;
                }
            };

            let identifier = request.identifier().to_string();
            let grader = Arc::clone(&grader);
            let permits = Arc::clone(&permits);
            let finished = Arc::clone(&finished);

            let task = tokio::spawn(
                async move {
                    let row = match permits.acquire_owned().await {
                        Ok(_permit) => match grader.grade(&request).await {
                            Ok(graded) => BatchRow::graded(request.identifier(), graded),
                            Err(err) => {
                                warn!(error = %err, "submission could not be graded");
                                BatchRow::failed(request.identifier(), &err)
                            }
                        },
                        Err(closed) => BatchRow::failed(
                            request.identifier(),
                            &GradingError::Internal(closed.to_string()),
                        ),
                    };

                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    info!("graded {done}/{total}");
                    row
                }
                .instrument(info_span!("submission", identifier = %identifier)),
            );
            slots.push(Slot::Running { identifier, task });
        }

        let rows = join_all(slots.into_iter().map(Slot::into_row)).await;

        let failed = rows.iter().filter(|r| r.error().is_some()).count();
        info!(failed, "batch finished");
        Ok(rows)
    }
    .instrument(span)
    .await
}
