#![cfg(unix)]

use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use stepexec::exec::Executor;
use stepexec::policy::ToolPolicy;
use stepexec::registry::ProcessRegistry;
use stepexec::server::{router, serve_on};
use stepexec::service::ExecutorService;
use stepexec_test_utils::{init_tracing, test_tools};

fn service() -> ExecutorService {
    let executor = Executor::new(
        ToolPolicy::new(test_tools()),
        ProcessRegistry::new(),
        Duration::from_secs(30),
    );
    ExecutorService::new(executor, "", 3)
}

fn setup() -> (TestServer, ExecutorService) {
    init_tracing();
    let service = service();
    let server = TestServer::new(router(service.clone())).expect("Failed to create test server");
    (server, service)
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_healthy_with_counts() {
        let (server, _service) = setup();

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["runningCount"], 0);
        assert_eq!(body["maxConcurrent"], 3);
        assert!(body["uptimeSeconds"].is_number());
        assert!(body["checkedAt"].is_string());
    }
}

mod execute {
    use super::*;

    #[tokio::test]
    async fn runs_an_allowed_tool() {
        let (server, service) = setup();

        let response = server
            .post("/v1/execute")
            .json(&json!({ "tool": "echo", "args": ["hi"] }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["exitCode"], 0);
        assert_eq!(body["stdout"], "hi\n");
        assert_eq!(body["timedOut"], false);
        assert!(body["processId"].is_string());
        assert!(body.get("error").is_none());
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn failing_command_is_still_a_200() {
        let (server, _service) = setup();

        let response = server
            .post("/v1/execute")
            .json(&json!({ "tool": "sh", "args": ["-c", "exit 7"] }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["exitCode"], 7);
    }

    #[tokio::test]
    async fn disallowed_tool_is_forbidden() {
        let (server, _service) = setup();

        let response = server
            .post("/v1/execute")
            .json(&json!({ "tool": "rm", "args": ["-rf", "/"] }))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(body["error"], "tool_not_allowed");
        assert!(body["message"].as_str().unwrap_or_default().contains("rm"));
    }

    #[tokio::test]
    async fn missing_tool_is_a_bad_request() {
        let (server, _service) = setup();

        let response = server
            .post("/v1/execute")
            .json(&json!({ "args": ["x"] }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn stream_emits_lines_then_result() {
        let (server, _service) = setup();

        let response = server
            .post("/v1/execute/stream")
            .json(&json!({ "tool": "sh", "args": ["-c", "echo a; echo b >&2"] }))
            .await;

        response.assert_status_ok();
        let text = response.text();
        assert!(text.contains("event: stdout"), "{text}");
        assert!(text.contains("event: stderr"), "{text}");
        let result_at = text.find("event: result").expect("result event");
        assert!(text.find("event: stdout").unwrap_or(usize::MAX) < result_at);
    }

    #[tokio::test]
    async fn stream_rejects_before_opening() {
        let (server, _service) = setup();

        let response = server
            .post("/v1/execute/stream")
            .json(&json!({ "tool": "curl" }))
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
    }
}

mod pipelines {
    use super::*;

    #[tokio::test]
    async fn reports_the_failing_step() {
        let (server, _service) = setup();

        let response = server
            .post("/v1/pipelines")
            .json(&json!({
                "id": "pipe-42",
                "name": "ci",
                "steps": [
                    { "name": "one", "tool": "true" },
                    { "name": "two", "tool": "false" },
                    { "name": "three", "tool": "echo", "args": ["never"] }
                ]
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["pipelineId"], "pipe-42");
        assert_eq!(body["success"], false);
        assert_eq!(body["failedStep"], "two");
        assert_eq!(body["completedSteps"], 2);
        assert_eq!(body["totalSteps"], 3);
    }

    #[tokio::test]
    async fn stream_ends_with_pipeline_completed() {
        let (server, _service) = setup();

        let response = server
            .post("/v1/pipelines/stream")
            .json(&json!({
                "name": "ci",
                "steps": [{ "name": "say", "tool": "echo", "args": ["hello"] }]
            }))
            .await;

        response.assert_status_ok();
        let text = response.text();
        let started = text.find("event: step_started").expect("step_started");
        let output = text.find("event: step_output").expect("step_output");
        let completed = text.find("event: step_completed").expect("step_completed");
        let done = text.find("event: pipeline_completed").expect("pipeline_completed");
        assert!(started < output && output < completed && completed < done);
    }
}

mod processes {
    use super::*;

    #[tokio::test]
    async fn list_is_empty_when_idle() {
        let (server, _service) = setup();

        let response = server.get("/v1/processes").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["count"], 0);
        assert_eq!(body["processes"], json!([]));
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_not_an_error() {
        let (server, _service) = setup();

        let response = server.post("/v1/processes/no-such-id/cancel").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap_or_default().contains("not found"));
    }

    #[tokio::test]
    async fn running_process_is_listed_and_cancellable() {
        let (server, service) = setup();

        let runner = service.clone();
        let task = tokio::spawn(async move {
            let request = stepexec::exec::ExecutionRequest {
                args: vec!["30".into()],
                ..stepexec::exec::ExecutionRequest::new("sleep")
            };
            runner.execute(&request).await
        });

        let mut listed = Value::Null;
        for _ in 0..200 {
            listed = server.get("/v1/processes").await.json();
            if listed["count"] == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["processes"][0]["tool"], "sleep");
        let id = listed["processes"][0]["processId"]
            .as_str()
            .expect("process id")
            .to_string();

        let response = server.post(&format!("/v1/processes/{id}/cancel")).await;
        let body: Value = response.json();
        assert_eq!(body["success"], true);

        let result = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("cancelled execution finishes")
            .expect("task joins")
            .expect("sleep is allowed");
        assert!(result.timed_out);
        assert_eq!(result.error.as_deref(), Some("command timed out"));
    }
}

mod shutdown {
    use super::*;

    #[tokio::test]
    async fn stop_cancels_processes_left_running() {
        init_tracing();
        let service = service();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");

        let runner = service.clone();
        let task = tokio::spawn(async move {
            let request = stepexec::exec::ExecutionRequest {
                args: vec!["30".into()],
                ..stepexec::exec::ExecutionRequest::new("sleep")
            };
            runner.execute(&request).await
        });
        for _ in 0..200 {
            if !service.registry().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.registry().len(), 1);

        serve_on(listener, service.clone(), async {}, Duration::from_millis(200))
            .await
            .expect("clean shutdown");

        let result = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("execution stops after shutdown")
            .expect("task joins")
            .expect("sleep is allowed");
        assert_eq!(result.error.as_deref(), Some("command timed out"));
        assert!(service.registry().is_empty());
    }
}
