mod support;

use std::{sync::Arc, time::Duration};

use aigrade::{BatchInput, GradingError, grade_batch, grade_inputs};
use support::{Script, ScriptedService, WELL_FORMED, grader, request, result_with, to_json};

#[tokio::test]
async fn one_failure_does_not_affect_siblings() {
    let service = ScriptedService::with_scripts(
        Script::structured(WELL_FORMED),
        [("Charlie", Script::failing())],
    );
    let grader = Arc::new(grader(service));
    let requests = ["Alice", "Bob", "Charlie", "Dana", "Eve"]
        .into_iter()
        .map(request)
        .collect();

    let rows = grade_batch(Arc::clone(&grader), requests, 2)
        .await
        .expect("batch runs");

    let ids: Vec<&str> = rows.iter().map(|r| r.identifier()).collect();
    assert_eq!(ids, ["Alice", "Bob", "Charlie", "Dana", "Eve"]);

    for row in &rows {
        if row.identifier() == "Charlie" {
            assert!(row.result().is_none());
            let error = row.error().expect("error recorded");
            assert!(error.starts_with("grading_unavailable:"), "{error}");
        } else {
            assert!(row.error().is_none(), "{:?}", row.error());
            assert_eq!(row.result().expect("graded").final_score, 91.0);
        }
    }
}

#[tokio::test]
async fn rows_follow_input_order_not_completion_order() {
    let service = ScriptedService::with_scripts(
        Script::structured(WELL_FORMED),
        [
            ("first", Script::structured(WELL_FORMED).with_delay(Duration::from_millis(60))),
            ("second", Script::structured(WELL_FORMED).with_delay(Duration::from_millis(30))),
        ],
    );
    let grader = Arc::new(grader(service));
    let requests = ["first", "second", "third"].into_iter().map(request).collect();

    let rows = grade_batch(grader, requests, 3).await.expect("batch runs");
    let ids: Vec<&str> = rows.iter().map(|r| r.identifier()).collect();
    assert_eq!(ids, ["first", "second", "third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_limit_is_respected() {
    let service = ScriptedService::uniform(
        Script::structured(WELL_FORMED).with_delay(Duration::from_millis(20)),
    );
    let grader = Arc::new(grader(service));
    let requests = (0..12).map(|i| request(&format!("student-{i}"))).collect();

    let rows = grade_batch(Arc::clone(&grader), requests, 3)
        .await
        .expect("batch runs");

    assert_eq!(rows.len(), 12);
    let service = grader.coordinator().service();
    assert!(service.max_in_flight() <= 3, "saw {}", service.max_in_flight());
    assert!(service.max_in_flight() >= 1);
    assert_eq!(service.structured_calls(), 12);
}

#[tokio::test]
async fn single_permit_runs_sequentially() {
    let service = ScriptedService::uniform(
        Script::structured(WELL_FORMED).with_delay(Duration::from_millis(5)),
    );
    let grader = Arc::new(grader(service));
    let requests = (0..4).map(|i| request(&format!("s{i}"))).collect();

    grade_batch(Arc::clone(&grader), requests, 1)
        .await
        .expect("batch runs");
    assert_eq!(grader.coordinator().service().max_in_flight(), 1);
}

#[tokio::test]
async fn duplicate_identifiers_are_rejected_before_any_call() {
    let grader = Arc::new(grader(ScriptedService::uniform(Script::structured(WELL_FORMED))));
    let requests = ["Alice", "Bob", "Alice"].into_iter().map(request).collect();

    let err = grade_batch(Arc::clone(&grader), requests, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::DuplicateIdentifier(ref id) if id == "Alice"));
    assert_eq!(grader.coordinator().service().total_calls(), 0);
}

#[tokio::test]
async fn empty_batch_and_zero_concurrency_are_rejected() {
    let grader = Arc::new(grader(ScriptedService::uniform(Script::structured(WELL_FORMED))));

    let err = grade_batch(Arc::clone(&grader), vec![], 2).await.unwrap_err();
    assert_eq!(err.kind(), "empty_batch");

    let err = grade_batch(Arc::clone(&grader), vec![request("A")], 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_concurrency");
    assert_eq!(grader.coordinator().service().total_calls(), 0);
}

#[tokio::test]
async fn review_flag_reaches_the_row() {
    let off_by_a_lot = result_with(&[("Missing requirement", 40.0)], 0.0, 95.0);
    let service = ScriptedService::with_scripts(
        Script::structured(WELL_FORMED),
        [("Bob", Script::structured(to_json(&off_by_a_lot)))],
    );
    let grader = Arc::new(grader(service));
    let requests = ["Alice", "Bob"].into_iter().map(request).collect();

    let rows = grade_batch(grader, requests, 2).await.expect("batch runs");
    assert!(!rows[0].needs_review());
    assert!(rows[1].needs_review());
    assert_eq!(rows[1].review().expect("review").recomputed, 60.0);
}

fn rejected(identifier: &str, reason: &str) -> BatchInput {
    BatchInput::Rejected {
        identifier: identifier.to_string(),
        reason:     reason.to_string(),
    }
}

#[tokio::test]
async fn rejected_inputs_become_error_rows_in_place() {
    let grader = Arc::new(grader(ScriptedService::uniform(Script::structured(WELL_FORMED))));
    let inputs = vec![
        request("Alice").into(),
        rejected("Broken", "Broken.zip contains no .java files"),
        request("Carol").into(),
    ];

    let rows = grade_inputs(Arc::clone(&grader), inputs, 2)
        .await
        .expect("batch runs");

    let ids: Vec<&str> = rows.iter().map(|r| r.identifier()).collect();
    assert_eq!(ids, ["Alice", "Broken", "Carol"]);

    assert!(rows[1].result().is_none());
    assert_eq!(
        rows[1].error(),
        Some("invalid_request: Invalid grading request: Broken.zip contains no .java files")
    );
    assert!(rows[0].error().is_none());
    assert!(rows[2].error().is_none());
    assert_eq!(grader.coordinator().service().structured_calls(), 2);
}

#[tokio::test]
async fn rejected_inputs_count_toward_duplicate_identifiers() {
    let grader = Arc::new(grader(ScriptedService::uniform(Script::structured(WELL_FORMED))));
    let inputs = vec![request("Alice").into(), rejected("Alice", "unreadable")];

    let err = grade_inputs(Arc::clone(&grader), inputs, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::DuplicateIdentifier(ref id) if id == "Alice"));
    assert_eq!(grader.coordinator().service().total_calls(), 0);
}

#[test]
fn internal_failures_have_their_own_kind() {
    let err = GradingError::Internal("task panicked".into());
    assert_eq!(err.kind(), "internal_error");
    assert_eq!(
        aigrade::BatchRow::failed("Zed", &err).error(),
        Some("internal_error: Internal grading failure: task panicked")
    );
}
