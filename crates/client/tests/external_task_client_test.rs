// HTTP tests for ExternalTaskClient against a mocked engine
//
// Run with: cargo test -p camunda-client --test external_task_client_test

use camunda_client::{
    BpmnErrorRequest, Client, ClientConfig, ClientError, CompleteRequest, ExtendLockRequest,
    ExternalTaskService, FailureRequest, FetchAndLock, FetchAndLockTopic, Variable, Variables,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Client {
    Client::new(ClientConfig::new(format!("{}/engine-rest", server.uri()))).unwrap()
}

fn fetch_query() -> FetchAndLock {
    FetchAndLock {
        worker_id: "worker-1".to_string(),
        max_tasks: 2,
        use_priority: None,
        async_response_timeout: Some(1000),
        topics: vec![FetchAndLockTopic::new("PrintHello").with_lock_duration(60_000)],
    }
}

#[tokio::test]
async fn test_fetch_and_lock_sends_query_and_parses_tasks() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/engine-rest/external-task/fetchAndLock"))
        .and(body_json(json!({
            "workerId": "worker-1",
            "maxTasks": 2,
            "asyncResponseTimeout": 1000,
            "topics": [{"topicName": "PrintHello", "lockDuration": 60000}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "task-1",
                "workerId": "worker-1",
                "topicName": "PrintHello",
                "lockExpirationTime": "2024-03-01T10:15:30.000+0000",
                "retries": null,
                "priority": 0,
                "variables": {
                    "isWorld": {"type": "Boolean", "value": true, "valueInfo": {}}
                }
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let tasks = client_for(&server)
        .external_task()
        .fetch_and_lock(&fetch_query())
        .await
        .unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "task-1");
    assert_eq!(tasks[0].topic_name, "PrintHello");
    assert_eq!(
        tasks[0].variable("isWorld").and_then(|v| v.as_bool()),
        Some(true)
    );
}

#[tokio::test]
async fn test_basic_auth_and_user_agent() {
    let server = MockServer::start().await;

    // "demo:secret" base64-encoded
    Mock::given(method("POST"))
        .and(path("/engine-rest/external-task/task-1/unlock"))
        .and(header("authorization", "Basic ZGVtbzpzZWNyZXQ="))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(
        ClientConfig::new(format!("{}/engine-rest", server.uri())).with_auth("demo", "secret"),
    )
    .unwrap();

    client.external_task().unlock("task-1").await.unwrap();
}

#[tokio::test]
async fn test_complete_sends_variables() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/engine-rest/external-task/task-1/complete"))
        .and(body_json(json!({
            "workerId": "worker-1",
            "variables": {"status": {"value": true, "type": "Boolean"}}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let request = CompleteRequest {
        worker_id: "worker-1".to_string(),
        variables: Some(Variables::from([(
            "status".to_string(),
            Variable::boolean(true),
        )])),
        local_variables: None,
    };

    client_for(&server)
        .external_task()
        .complete("task-1", &request)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failure_bpmn_error_and_extend_lock_paths() {
    let server = MockServer::start().await;

    for endpoint in ["failure", "bpmnError", "extendLock"] {
        Mock::given(method("POST"))
            .and(path(format!("/engine-rest/external-task/task-1/{endpoint}")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    let tasks = client_for(&server).external_task();

    tasks
        .handle_failure(
            "task-1",
            &FailureRequest {
                worker_id: "worker-1".to_string(),
                error_message: Some("boom".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    tasks
        .handle_bpmn_error(
            "task-1",
            &BpmnErrorRequest {
                worker_id: "worker-1".to_string(),
                error_code: "invalid-order".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    tasks
        .extend_lock(
            "task-1",
            &ExtendLockRequest {
                worker_id: "worker-1".to_string(),
                new_duration: 30_000,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_json_404_maps_to_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/engine-rest/external-task/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "type": "RestException",
            "message": "External task with id missing does not exist"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .external_task()
        .get("missing")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_structured_engine_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/engine-rest/external-task/task-1/complete"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "type": "BadUserRequestException",
            "message": "External task task-1 is locked by worker 'other'"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .external_task()
        .complete(
            "task-1",
            &CompleteRequest {
                worker_id: "worker-1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.error_type(), Some("BadUserRequestException"));
    assert_eq!(
        err.to_string(),
        "External task task-1 is locked by worker 'other'"
    );
}

#[tokio::test]
async fn test_undecodable_json_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/engine-rest/external-task/task-1/unlock"))
        .respond_with(
            ResponseTemplate::new(400).set_body_raw("not json", "application/json"),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .external_task()
        .unlock("task-1")
        .await
        .unwrap_err();

    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 400);
            assert!(body.starts_with("failed unmarshal error response"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_text_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/engine-rest/external-task/fetchAndLock"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .external_task()
        .fetch_and_lock(&fetch_query())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "response error with status code 502: bad gateway"
    );
}

#[tokio::test]
async fn test_get_and_set_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/engine-rest/external-task/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "task-1",
            "topicName": "PrintHello",
            "workerId": null,
            "retries": 3,
            "suspended": false,
            "priority": 5
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/engine-rest/external-task/task-1/retries"))
        .and(body_json(json!({"retries": 0})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let tasks = client_for(&server).external_task();
    let task = tasks.get("task-1").await.unwrap();
    assert_eq!(task.retries, Some(3));
    assert_eq!(task.priority, 5);

    tasks.set_retries("task-1", 0).await.unwrap();
}

#[tokio::test]
async fn test_task_id_is_percent_encoded_in_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/engine-rest/external-task/task%2F1%3Fx/unlock"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .external_task()
        .unlock("task/1?x")
        .await
        .unwrap();
}
