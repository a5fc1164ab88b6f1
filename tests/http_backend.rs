//! End-to-end tests against a mock backend and OAuth token endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pawject_client::{
    ApiRequest, AuthRuntimeState, Config, HttpClient, LoginRequiredCallback,
    RefreshTokenProvider, ReqwestTransport, StaticTokenProvider, TokenInfo, TokenProvider,
};

fn client_for(server: &MockServer, provider: Option<Arc<dyn TokenProvider>>) -> HttpClient {
    let transport = ReqwestTransport::builder()
        .base_url(&format!("{}/api", server.uri()))
        .unwrap()
        .with_credentials(true)
        .build()
        .unwrap();
    let state = Arc::new(AuthRuntimeState::new());
    let authenticated = provider.is_some();
    state.bind_session(provider, authenticated);
    HttpClient::new(Arc::new(transport), state)
}

fn refresh_provider(server: &MockServer, access: &str, refresh: &str) -> Arc<RefreshTokenProvider> {
    Arc::new(RefreshTokenProvider::new(
        format!("{}/oauth/token", server.uri()),
        "pawject-web",
        TokenInfo::new(access.to_string(), Some(refresh.to_string()), Some(3600)),
    ))
}

fn count_prompts(client: &HttpClient) -> Arc<AtomicUsize> {
    let prompts = Arc::new(AtomicUsize::new(0));
    let seen = prompts.clone();
    let callback: LoginRequiredCallback = Arc::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    client.state().set_login_required_callback(callback);
    prompts
}

#[tokio::test]
async fn test_bearer_token_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/animals"))
        .and(header("authorization", "Bearer static-token"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "Burek"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some(Arc::new(StaticTokenProvider::new("static-token"))));
    let animals: serde_json::Value = client.get_json("animals").await.unwrap();

    assert_eq!(animals[0]["name"], "Burek");
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_once_for_concurrent_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .with_priority(1)
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(10)
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=pawject-web"))
        .and(body_string_contains("refresh_token=rt-1"))
        .and(body_string_contains("audience=pawject-api"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "new-access",
                    "refresh_token": "rt-2",
                    "expires_in": 3600
                }))
                // Keeps the refresh open while the other requests hit 401.
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = refresh_provider(&server, "old-access", "rt-1");
    let client = client_for(&server, Some(provider.clone()));
    client.state().set_authorization_params(BTreeMap::from([(
        "audience".to_string(),
        "pawject-api".to_string(),
    )]));
    let prompts = count_prompts(&client);

    let results = join_all((0..4).map(|i| {
        let client = client.clone();
        async move { client.get(&format!("animals/{i}")).await }
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap().status, StatusCode::OK);
    }
    assert_eq!(prompts.load(Ordering::SeqCst), 0);

    let info = provider.token_info().await.unwrap();
    assert_eq!(info.access_token, "new-access");
    assert_eq!(info.refresh_token.as_deref(), Some("rt-2"));
}

#[tokio::test]
async fn test_rejected_refresh_token_asks_for_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/adoptions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Token expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = refresh_provider(&server, "old-access", "rt-revoked");
    let client = client_for(&server, Some(provider.clone()));
    let prompts = count_prompts(&client);

    let err = client.get("adoptions").await.unwrap_err();

    assert!(err.requires_login());
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    let info = provider.token_info().await.unwrap();
    assert_eq!(info.refresh_token, None);
}

#[tokio::test]
async fn test_token_endpoint_outage_is_not_a_login_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = client_for(&server, Some(refresh_provider(&server, "old-access", "rt-1")));
    let prompts = count_prompts(&client);

    let err = client.get("animals").await.unwrap_err();

    assert!(!err.requires_login());
    assert_eq!(
        err.to_string(),
        "Token refresh failed: Token endpoint returned 503: maintenance"
    );
    assert_eq!(prompts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_server_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/animals"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, Some(refresh_provider(&server, "old-access", "rt-1")));
    let err = client.get("animals").await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "HTTP 500: boom");
}

#[tokio::test]
async fn test_anonymous_401_is_returned_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client.get("profile").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(client.state().refresh_cycles(), 0);
}

#[tokio::test]
async fn test_download_uses_content_disposition_filename() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reports/7"))
        .and(header("accept", "*/*"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-disposition", r#"attachment; filename="intake-7.pdf""#)
                .set_body_bytes(b"%PDF-1.7".to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reports/8"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
        .mount(&server)
        .await;

    let client = client_for(&server, Some(Arc::new(StaticTokenProvider::new("t"))));

    let named = client.download(ApiRequest::get("reports/7")).await.unwrap();
    assert_eq!(named.filename, "intake-7.pdf");
    assert_eq!(&named.bytes[..], b"%PDF-1.7");

    let unnamed = client.download(ApiRequest::get("reports/8")).await.unwrap();
    assert_eq!(unnamed.filename, pawject_client::net::DEFAULT_DOWNLOAD_FILENAME);
}

#[tokio::test]
async fn test_query_and_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/animals"))
        .and(query_param("shelter", "north"))
        .and(body_json(json!({"name": "Rex", "species": "dog"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 12})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some(Arc::new(StaticTokenProvider::new("t"))));
    let request = ApiRequest::post("animals")
        .query("shelter", "north")
        .json(&json!({"name": "Rex", "species": "dog"}))
        .unwrap();

    let response = client.execute(request).await.unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json::<serde_json::Value>().unwrap()["id"], 12);
}

#[tokio::test]
async fn test_session_cookie_is_sent_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(204).insert_header("set-cookie", "sid=abc123; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("cookie", "sid=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": "ola"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    client.execute(ApiRequest::post("session")).await.unwrap();
    let me: serde_json::Value = client.get_json("me").await.unwrap();

    assert_eq!(me["user"], "ola");
}

#[tokio::test]
async fn test_client_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .and(header("authorization", "Bearer configured"))
        .and(header("user-agent", "pawject-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.backend.url = format!("{}/api/", server.uri());
    config.backend.user_agent = "pawject-tests".to_string();
    config.auth.access_token = Some("configured".to_string());

    let client = HttpClient::from_config(&config).unwrap();
    assert!(client.state().is_authenticated());

    let response = client.get("health").await.unwrap();
    assert_eq!(response.text(), "ok");
}
