use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use stepexec::exec::Channel;
use stepexec::pipeline::{PipelineEvent, PipelineRunner};
use stepexec_test_utils::{
    FakeOutcome, FakeStepExecutor, PipelineRequestBuilder, StepBuilder, init_tracing,
};

type TestResult = Result<(), Box<dyn Error>>;

fn three_steps(second_continues: bool) -> stepexec::pipeline::PipelineRequest {
    let mut step2 = StepBuilder::new("step2", "tool-b");
    if second_continues {
        step2 = step2.continue_on_error();
    }
    PipelineRequestBuilder::new("build")
        .id("pipe-1")
        .step(StepBuilder::new("step1", "tool-a").build())
        .step(step2.build())
        .step(StepBuilder::new("step3", "tool-c").build())
        .build()
}

fn failing_second_step() -> FakeStepExecutor {
    FakeStepExecutor::new().with_outcome(
        "tool-b",
        FakeOutcome::Fail {
            code: 2,
            stderr: vec!["boom".into()],
        },
    )
}

#[tokio::test]
async fn failure_without_continue_halts_the_pipeline() -> TestResult {
    init_tracing();
    let fake = failing_second_step();
    let runner = PipelineRunner::new(fake.clone());

    let result = runner.run(&three_steps(false)).await;

    assert_eq!(result.pipeline_id, "pipe-1");
    assert_eq!(result.name, "build");
    assert!(!result.success);
    assert_eq!(result.failed_step, "step2");
    assert_eq!(result.total_steps, 3);
    assert_eq!(result.completed_steps, 2);
    assert_eq!(result.step_results.len(), 2);
    assert_eq!(result.step_results[1].execute_result.exit_code, 2);
    assert_eq!(fake.executed_tools(), vec!["tool-a", "tool-b"]);
    Ok(())
}

#[tokio::test]
async fn continue_on_error_runs_the_rest_and_keeps_success() -> TestResult {
    init_tracing();
    let fake = failing_second_step();
    let runner = PipelineRunner::new(fake.clone());

    let result = runner.run(&three_steps(true)).await;

    assert!(result.success);
    assert_eq!(result.failed_step, "");
    assert_eq!(result.completed_steps, 3);
    assert!(!result.step_results[1].execute_result.success);
    assert_eq!(fake.executed_tools(), vec!["tool-a", "tool-b", "tool-c"]);
    for (i, step) in result.step_results.iter().enumerate() {
        assert_eq!(step.step_index, i);
    }
    Ok(())
}

#[tokio::test]
async fn empty_pipeline_succeeds_immediately() -> TestResult {
    init_tracing();
    let runner = PipelineRunner::new(FakeStepExecutor::new());

    let result = runner.run(&PipelineRequestBuilder::new("nothing").build()).await;

    assert!(result.success);
    assert_eq!(result.total_steps, 0);
    assert_eq!(result.completed_steps, 0);
    assert!(result.step_results.is_empty());
    assert!(!result.pipeline_id.is_empty(), "blank id is replaced");
    Ok(())
}

#[tokio::test]
async fn rejected_step_is_recorded_as_a_failure() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new().with_outcome("rm", FakeOutcome::Reject);
    let runner = PipelineRunner::new(fake.clone());
    let request = PipelineRequestBuilder::new("p")
        .step(StepBuilder::new("cleanup", "rm").args(&["-rf", "x"]).build())
        .step(StepBuilder::new("after", "tool-a").build())
        .build();

    let result = runner.run(&request).await;

    assert!(!result.success);
    assert_eq!(result.failed_step, "cleanup");
    let step = &result.step_results[0].execute_result;
    assert_eq!(step.exit_code, -1);
    assert_eq!(step.tool, "rm");
    assert_eq!(step.args, vec!["-rf", "x"]);
    assert!(step.error.as_deref().unwrap_or_default().contains("not allowed"));
    assert_eq!(fake.executed_tools(), vec!["rm"]);
    Ok(())
}

#[tokio::test]
async fn step_requests_compose_env_and_directories() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new();
    let runner = PipelineRunner::new(fake.clone()).with_workspace_base("/srv/builds");
    let request = PipelineRequestBuilder::new("compose")
        .workspace("job-7")
        .env("SHARED=1")
        .env("MODE=pipeline")
        .step(
            StepBuilder::new("install", "npm")
                .work_dir("app")
                .env("MODE=step")
                .build(),
        )
        .step(StepBuilder::new("root", "make").build())
        .step(StepBuilder::new("abs", "make").work_dir("/opt/elsewhere").build())
        .build();

    let result = runner.run(&request).await;
    assert!(result.success);

    let calls = fake.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].request.work_dir, Some(PathBuf::from("/srv/builds/job-7/app")));
    assert_eq!(calls[0].request.env, vec!["SHARED=1", "MODE=pipeline", "MODE=step"]);
    assert_eq!(calls[1].request.work_dir, Some(PathBuf::from("/srv/builds/job-7")));
    assert_eq!(calls[1].request.env, vec!["SHARED=1", "MODE=pipeline"]);
    assert_eq!(calls[2].request.work_dir, Some(PathBuf::from("/opt/elsewhere")));
    Ok(())
}

#[tokio::test]
async fn no_pipeline_timeout_means_no_enclosing_deadline() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new();
    let runner = PipelineRunner::new(fake.clone());
    let request = PipelineRequestBuilder::new("p")
        .step(StepBuilder::new("a", "tool-a").timeout_secs(5).build())
        .build();

    runner.run(&request).await;

    let calls = fake.calls();
    assert!(calls[0].enclosing.is_none());
    assert_eq!(calls[0].request.timeout_seconds, Some(5));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn every_step_shares_one_pipeline_deadline() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new()
        .with_outcome("slow", FakeOutcome::Delay(Duration::from_secs(4)));
    let runner = PipelineRunner::new(fake.clone());
    let request = PipelineRequestBuilder::new("p")
        .timeout_secs(60)
        .step(StepBuilder::new("a", "slow").build())
        .step(StepBuilder::new("b", "slow").build())
        .build();

    let result = runner.run(&request).await;
    assert!(result.success);

    let calls = fake.calls();
    let first = calls[0].enclosing.expect("pipeline deadline passed to step a");
    let second = calls[1].enclosing.expect("pipeline deadline passed to step b");
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_deadline_halts_even_continue_on_error_steps() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new().with_outcome("stuck", FakeOutcome::Hang);
    let runner = PipelineRunner::new(fake.clone());
    let request = PipelineRequestBuilder::new("p")
        .timeout_secs(10)
        .step(StepBuilder::new("first", "tool-a").build())
        .step(StepBuilder::new("hang", "stuck").continue_on_error().build())
        .step(StepBuilder::new("never", "tool-c").build())
        .build();

    let result = runner.run(&request).await;

    assert!(!result.success);
    assert_eq!(result.failed_step, "hang");
    assert_eq!(result.completed_steps, 2);
    assert!(result.step_results[1].execute_result.timed_out);
    assert_eq!(fake.executed_tools(), vec!["tool-a", "stuck"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn step_timeout_is_capped_by_pipeline_deadline() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new()
        .with_outcome("slow", FakeOutcome::Delay(Duration::from_secs(30)));
    let runner = PipelineRunner::new(fake.clone());
    let request = PipelineRequestBuilder::new("p")
        .timeout_secs(5)
        .step(StepBuilder::new("slow", "slow").timeout_secs(120).build())
        .build();

    let started = tokio::time::Instant::now();
    let result = runner.run(&request).await;

    assert!(!result.success);
    assert!(result.step_results[0].execute_result.timed_out);
    assert!(started.elapsed() <= Duration::from_secs(6));
    Ok(())
}

#[tokio::test]
async fn streaming_emits_events_in_order() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new()
        .with_outcome("tool-a", FakeOutcome::Succeed(vec!["hello".into(), "world".into()]));
    let runner = PipelineRunner::new(fake);
    let request = PipelineRequestBuilder::new("stream")
        .step(StepBuilder::new("greet", "tool-a").build())
        .step(StepBuilder::new("quiet", "tool-b").build())
        .build();

    let (tx, mut rx) = mpsc::channel(64);
    let result = runner.run_streaming(&request, &tx).await;
    drop(tx);

    let mut kinds = Vec::new();
    let mut lines = Vec::new();
    let mut final_result = None;
    while let Some(event) = rx.recv().await {
        kinds.push(event.kind());
        match event {
            PipelineEvent::StepOutput {
                step_name,
                step_index,
                channel,
                line,
            } => {
                assert_eq!(step_name, "greet");
                assert_eq!(step_index, 0);
                assert_eq!(channel, Channel::Stdout);
                lines.push(line);
            }
            PipelineEvent::StepStarted { total_steps, .. } => assert_eq!(total_steps, 2),
            PipelineEvent::PipelineCompleted(done) => final_result = Some(done),
            PipelineEvent::StepCompleted(_) => {}
        }
    }

    assert_eq!(
        kinds,
        vec![
            "step_started",
            "step_output",
            "step_output",
            "step_completed",
            "step_started",
            "step_completed",
            "pipeline_completed",
        ]
    );
    assert_eq!(lines, vec!["hello", "world"]);
    assert_eq!(final_result, Some(result));
    Ok(())
}

#[tokio::test]
async fn closed_observer_does_not_stop_the_pipeline() -> TestResult {
    init_tracing();
    let fake = FakeStepExecutor::new()
        .with_outcome("tool-a", FakeOutcome::Succeed(vec!["line".into()]));
    let runner = PipelineRunner::new(fake.clone());
    let request = PipelineRequestBuilder::new("p")
        .step(StepBuilder::new("one", "tool-a").build())
        .step(StepBuilder::new("two", "tool-a").build())
        .build();

    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let result = runner.run_streaming(&request, &tx).await;

    assert!(result.success);
    assert_eq!(result.completed_steps, 2);
    assert_eq!(result.step_results[1].execute_result.stdout, "line\n");
    assert_eq!(fake.executed_tools().len(), 2);
    Ok(())
}
