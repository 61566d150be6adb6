//! HTTP backend against a mock policy API

use policy_reconciler::{
    AggregateTransport, ClientConfig, ErrorCategory, HttpBackend, OperationContext, Principal,
    PrincipalType, ProviderError, Reconciler, RetryPolicy, StaticToken,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_delay_millis: 10,
        max_delay_millis: 50,
        ..RetryPolicy::default()
    }
}

fn reconciler(server: &MockServer) -> Reconciler {
    let config = ClientConfig::new(format!("{}/api/v2", server.uri())).with_retry(fast_retry());
    let backend = HttpBackend::new(&config, Arc::new(StaticToken::new("secret-token"))).unwrap();
    Reconciler::new(AggregateTransport::new(Arc::new(backend), config.retry.clone()))
}

fn policy_body() -> serde_json::Value {
    json!({
        "id": "pol-1",
        "name": "prod-readers",
        "status": "ACTIVE",
        "principals": [
            { "principalId": "alice", "principalType": "USER", "sourceDirectoryId": "dir-1" }
        ],
        "targets": {},
        "reviewCycleDays": 90
    })
}

#[tokio::test]
async fn test_fetch_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policies/pol-1"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_body()))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = OperationContext::new("policy.read");
    let policy = reconciler(&server)
        .policies()
        .read(&ctx, "pol-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(policy.name, "prod-readers");
    assert_eq!(policy.extra["reviewCycleDays"], json!(90));
}

#[tokio::test]
async fn test_fetch_404_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policies/pol-1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("policy not found"))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = OperationContext::new("policy.read");
    let found = reconciler(&server).policies().read(&ctx, "pol-1").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_delete_404_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/policies/pol-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = OperationContext::new("policy.delete");
    reconciler(&server).policies().delete(&ctx, "pol-1").await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policies/pol-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policies/pol-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_body()))
        .expect(1)
        .mount(&server)
        .await;

    let r = reconciler(&server);
    let ctx = OperationContext::new("policy.read");
    assert!(r.policies().read(&ctx, "pol-1").await.unwrap().is_some());
    assert_eq!(r.transport().stats().snapshot().retries, 1);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policies/pol-1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = OperationContext::new("policy.read");
    let err = reconciler(&server)
        .policies()
        .read(&ctx, "pol-1")
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Auth);
    assert!(matches!(err, ProviderError::NonRetryable { .. }));
}

#[tokio::test]
async fn test_persistent_failure_exhausts_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policies/pol-1"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let ctx = OperationContext::new("policy.read");
    let err = reconciler(&server)
        .policies()
        .read(&ctx, "pol-1")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("max retries exceeded"));
    assert_eq!(err.category(), ErrorCategory::Server);
}

#[tokio::test]
async fn test_principal_create_writes_whole_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policies/pol-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(policy_body()))
        .mount(&server)
        .await;

    let mut written = policy_body();
    written["principals"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "principalId": "ops", "principalType": "ROLE" }));
    Mock::given(method("PUT"))
        .and(path("/api/v2/policies/pol-1"))
        .and(body_partial_json(json!({
            "reviewCycleDays": 90,
            "principals": [
                { "principalId": "alice", "principalType": "USER", "sourceDirectoryId": "dir-1" },
                { "principalId": "ops", "principalType": "ROLE" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(written))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = OperationContext::new("principal.create");
    let (id, _) = reconciler(&server)
        .principals()
        .create(&ctx, "pol-1", Principal::new("ops", PrincipalType::Role))
        .await
        .unwrap();
    assert_eq!(id, "pol-1:ops:ROLE");
}

#[tokio::test]
async fn test_conflict_on_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/policies"))
        .respond_with(
            ResponseTemplate::new(409).set_body_string("a policy with this name already exists"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ctx = OperationContext::new("policy.create");
    let err = reconciler(&server)
        .policies()
        .create(&ctx, &policy_reconciler::PolicySpec::new("prod-readers"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Conflict);

    let diag = policy_reconciler::diagnose(&err, policy_reconciler::Action::Create);
    assert!(diag.detail.contains("Import"));
}
