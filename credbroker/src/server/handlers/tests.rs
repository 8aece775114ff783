use hyper::body::to_bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::token::TOKEN_TTL_HEADER;
use crate::broker::error::ProviderError;
use crate::broker::testing::{FakeIdentityProvider, StaticConfigResolver, PROFILES};
use crate::broker::CredentialBroker;
use crate::common::ConfigResolver;
use crate::server::service::MetadataService;
use crate::server::CREDENTIALS_PATH;

fn service_with(provider: Arc<FakeIdentityProvider>) -> MetadataService {
    let resolver: Arc<dyn ConfigResolver> = Arc::new(StaticConfigResolver::from_yaml(PROFILES));
    let broker = Arc::new(CredentialBroker::new(provider, resolver.clone(), None));
    MetadataService::new(broker, resolver)
}

async fn send(service: &MetadataService, method: Method, path: &str, body: &str) -> Response<Body> {
    let req = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::from(body.to_string()))
        .unwrap();
    service.handle_request(req).await.unwrap()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_refresh_without_credentials_succeeds() {
    let provider = Arc::new(FakeIdentityProvider::new());
    let service = service_with(provider);

    let response = send(&service, Method::POST, "/refresh", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "success");

    let response = send(&service, Method::GET, "/refresh", "").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_select_and_get_profile() {
    let provider = Arc::new(FakeIdentityProvider::new());
    let service = service_with(provider.clone());

    let response = send(&service, Method::GET, "/profile", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "");

    let response = send(&service, Method::POST, "/profile", "  admin\n").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_string(response).await.is_empty());
    assert_eq!(provider.session_calls.load(Ordering::SeqCst), 1);

    let response = send(&service, Method::GET, "/profile", "").await;
    assert_eq!(body_string(response).await, "admin");
}

#[tokio::test]
async fn test_select_unknown_profile() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));

    let response = send(&service, Method::POST, "/profile", "nope").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Error resolving profile config");
}

#[tokio::test]
async fn test_mfa_profile_flow() {
    let provider = Arc::new(FakeIdentityProvider::new().with_mfa_code("123456"));
    let service = service_with(provider.clone());

    let response = send(&service, Method::POST, "/profile", "mfa").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(provider.session_calls.load(Ordering::SeqCst), 0);

    let response = send(&service, Method::POST, "/mfa", "654321").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(provider.session_calls.load(Ordering::SeqCst), 1);

    let response = send(&service, Method::POST, "/mfa", "123456789").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(provider.session_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_short_mfa_code_is_rejected_without_provider_call() {
    let provider = Arc::new(FakeIdentityProvider::new().with_mfa_code("123456"));
    let service = service_with(provider.clone());
    send(&service, Method::POST, "/profile", "mfa").await;

    let response = send(&service, Method::POST, "/mfa", "12345").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "Invalid MFA Code");
    assert_eq!(provider.session_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_mfa_without_active_profile() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));

    let response = send(&service, Method::POST, "/mfa", "123456").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_credentials_discovery_returns_profile_name() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));
    send(&service, Method::POST, "/profile", "readonly").await;

    let response = send(&service, Method::GET, CREDENTIALS_PATH, "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "readonly");

    let response = send(
        &service,
        Method::GET,
        "/latest/meta-data/iam/security-credentials",
        "",
    )
    .await;
    assert_eq!(body_string(response).await, "readonly");
}

#[tokio::test]
async fn test_credentials_document() {
    let provider = Arc::new(FakeIdentityProvider::new());
    let service = service_with(provider.clone());
    send(&service, Method::POST, "/profile", "admin").await;

    let path = format!("{}admin", CREDENTIALS_PATH);
    let response = send(&service, Method::GET, &path, "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

    let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(value["Code"], "Success");
    assert_eq!(value["Type"], "AWS-HMAC");
    assert_eq!(value["AccessKeyId"], "ASIAROLE");
    assert_eq!(value["SecretAccessKey"], "role-secret");
    assert_eq!(value["Token"], "role-token");
    assert!(value["LastUpdated"].is_string());
    assert!(value["Expiration"].is_string());
    assert_eq!(provider.assume_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_credentials_without_profile_is_server_error() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));

    let path = format!("{}admin", CREDENTIALS_PATH);
    let response = send(&service, Method::GET, &path, "").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Error getting role credentials");
}

#[tokio::test]
async fn test_assume_role_failure_hides_provider_detail() {
    let provider = Arc::new(FakeIdentityProvider::new());
    let service = service_with(provider.clone());
    send(&service, Method::POST, "/profile", "admin").await;
    provider.fail_assume_role(ProviderError::new(
        Some("AccessDenied"),
        "not allowed to assume arn:aws:iam::123456789012:role/Admin",
    ));

    let path = format!("{}admin", CREDENTIALS_PATH);
    let response = send(&service, Method::GET, &path, "").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_string(response).await;
    assert_eq!(body, "Error getting role credentials");
    assert!(!body.contains("not allowed"));
    assert!(!body.contains("AccessDenied"));
    assert_eq!(provider.assume_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_list_roles_is_sorted_json() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));

    let response = send(&service, Method::GET, "/list-roles", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    let roles: Vec<String> = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(roles, vec!["admin", "mfa", "other", "readonly"]);
}

#[tokio::test]
async fn test_home_page_lists_roles() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));

    let response = send(&service, Method::GET, "/", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
    assert!(body_string(response).await.contains("<option>readonly</option>"));
}

#[tokio::test]
async fn test_token_handshake_echoes_ttl() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));

    let req = Request::builder()
        .method(Method::PUT)
        .uri("/latest/api/token")
        .header(TOKEN_TTL_HEADER, "300")
        .body(Body::empty())
        .unwrap();
    let response = service.handle_request(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[TOKEN_TTL_HEADER], "300");
    assert_eq!(body_string(response).await.len(), 36);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let service = service_with(Arc::new(FakeIdentityProvider::new()));

    let response = send(&service, Method::GET, "/latest/user-data", "").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
