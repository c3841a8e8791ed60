mod support;

use aigrade::{GradingRequest, coordinator::InvocationMode};
use support::{
    Freeform, RUBRIC, Script, ScriptedService, WELL_FORMED, grader, request, result_with, to_json,
};

#[tokio::test]
async fn grades_with_recomputed_score() {
    let proposed = result_with(&[("Integer division", 5.0), ("Style", 4.0)], 0.0, 97.0);
    let grader = grader(ScriptedService::uniform(Script::structured(to_json(&proposed))));

    let graded = grader.grade(&request("Ada")).await.expect("graded");
    assert_eq!(graded.result.final_score, 91.0);
    assert_eq!(graded.mode, InvocationMode::Structured);
    let gap = graded.discrepancy.expect("score was overridden");
    assert_eq!(gap.proposed, 97.0);
    assert_eq!(gap.recomputed, 91.0);
}

#[tokio::test]
async fn fallback_results_are_rescored_too() {
    let grader = grader(ScriptedService::uniform(
        Script::failing().then_freeform(Freeform::Text(WELL_FORMED.into())),
    ));
    let req = GradingRequest::builder()
        .identifier("Ada")
        .source_code("class Main {}")
        .requirements_text(RUBRIC)
        .max_points(50.0)
        .build();

    let graded = grader.grade(&req).await.expect("graded");
    assert_eq!(graded.mode, InvocationMode::Fallback);
    // 50 - 9
    assert_eq!(graded.result.final_score, 41.0);
    assert!(graded.discrepancy.expect("overridden").needs_review);
}

#[tokio::test]
async fn invalid_requests_make_no_calls() {
    let grader = grader(ScriptedService::uniform(Script::structured(WELL_FORMED)));

    let too_many_points = GradingRequest::builder()
        .identifier("A")
        .source_code("class Main {}")
        .requirements_text(RUBRIC)
        .max_points(500.0)
        .build();
    let err = grader.grade(&too_many_points).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_request");

    let no_source = GradingRequest::builder()
        .identifier("B")
        .source_code("")
        .requirements_text(RUBRIC)
        .max_points(100.0)
        .build();
    let err = grader.grade(&no_source).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_request");

    assert_eq!(grader.coordinator().service().total_calls(), 0);
}

#[tokio::test]
async fn refusal_surfaces_as_refused() {
    let grader = grader(ScriptedService::uniform(Script::refuse("Policy")));
    let err = grader.grade(&request("A")).await.unwrap_err();
    assert_eq!(err.kind(), "refused");
    assert_eq!(grader.coordinator().service().freeform_calls(), 0);
}
