//! Integration tests for the runner layer.
//!
//! The mock runner is driven through the trait object, the way the wrapper
//! uses it.

use std::sync::Arc;

use tflocal_runner::{
    CommandConfig, MockResponse, MockRunner, RunConfig, RunnerError, StdinMode, ToolRunner,
};

/// Test the mock through a trait object.
#[tokio::test]
async fn test_mock_runner_as_trait_object() {
    let mock = MockRunner::new().add_response(MockResponse::success("ok"));
    let runner: Arc<dyn ToolRunner> = Arc::new(mock.clone());

    let result = runner
        .run(&CommandConfig::new("terraform").arg("plan"), &RunConfig::interactive())
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(result.stdout, "ok");
    assert_eq!(mock.call_count(), 1);
    assert!(mock.was_called("run"));
}

/// Test sequential execution with multiple responses.
#[tokio::test]
async fn test_mock_runner_sequential_responses() {
    let runner = MockRunner::new().with_responses(vec![
        MockResponse::success(r#"{"terraform_version":"1.6.2"}"#),
        MockResponse::failure(2, "Error: Invalid provider configuration"),
    ]);

    let probe = runner
        .run(
            &CommandConfig::new("terraform").args(["version", "-json"]),
            &RunConfig::capture(),
        )
        .await
        .unwrap();
    assert!(probe.stdout.contains("terraform_version"));

    let apply = runner
        .run(
            &CommandConfig::new("terraform").arg("apply"),
            &RunConfig::interactive().script("yes\n"),
        )
        .await
        .unwrap();
    assert!(!apply.success());
    assert_eq!(apply.exit_code, 2);

    let calls = runner.get_calls();
    assert!(calls[0].capture_output);
    assert_eq!(calls[1].stdin, Some(StdinMode::Script("yes\n".to_string())));

    runner.clear_calls();
    assert_eq!(runner.call_count(), 0);
}

/// Test failure simulation.
#[tokio::test]
async fn test_mock_runner_failure_simulation() {
    let runner = MockRunner::new().simulate_failure("simulated failure");

    let result = runner
        .run(&CommandConfig::new("terraform"), &RunConfig::default())
        .await;

    if let Err(RunnerError::ExecutionFailed(msg)) = result {
        assert!(msg.contains("simulated"));
    } else {
        panic!("Expected ExecutionFailed error");
    }
}
