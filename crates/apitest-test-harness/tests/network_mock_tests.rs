use apitest_test_harness::mocks::network::*;
use std::time::Duration;

#[tokio::test]
async fn test_mock_get_json() {
    let server = TestHttpServer::start().await;

    server.get_json("/api/users/1", &serde_json::json!({
        "id": 1,
        "name": "Test User"
    })).await;

    let client = reqwest::Client::new();
    let response = client
        .get(server.url_for("/api/users/1"))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Test User");
    server.verify_received("/api/users/1", 1).await;
}

#[tokio::test]
async fn test_mock_builder_pattern() {
    let server = TestHttpServer::start().await;

    MockBuilder::post("/api/login")
        .with_header("Content-Type", "application/json")
        .with_json_body(serde_json::json!({ "username": "test" }))
        .respond_json(200, &serde_json::json!({
            "token": "abc123"
        }))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let response = client
        .post(server.url_for("/api/login"))
        .json(&serde_json::json!({ "username": "test" }))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_mock_sequence_serves_in_order() {
    let server = TestHttpServer::start().await;

    server.sequence("/api/data", vec![
        responses::rate_limited(1),
        responses::ok().set_body_json(serde_json::json!({ "data": "success" })),
    ]).await;

    let client = reqwest::Client::new();

    let first = client.get(server.url_for("/api/data")).send().await.unwrap();
    assert_eq!(first.status(), 429);
    assert_eq!(first.headers()["retry-after"], "1");

    let second = client.get(server.url_for("/api/data")).send().await.unwrap();
    assert_eq!(second.status(), 200);

    // Exhausted: falls through to wiremock's default.
    let third = client.get(server.url_for("/api/data")).send().await.unwrap();
    assert_eq!(third.status(), 404);
}

#[tokio::test]
async fn test_echo_describes_request() {
    let server = TestHttpServer::start().await;
    server.echo("/echo").await;

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .put(server.url_for("/echo?tag=a&tag=b&page=1"))
        .header("x-trace", "42")
        .json(&serde_json::json!({ "name": "virk" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["method"], "PUT");
    assert_eq!(body["path"], "/echo");
    assert_eq!(body["query"], serde_json::json!({ "tag": ["a", "b"], "page": "1" }));
    assert_eq!(body["headers"]["x-trace"], "42");
    assert_eq!(body["json"], serde_json::json!({ "name": "virk" }));
}

#[tokio::test]
async fn test_with_cookies_sets_every_cookie() {
    let server = TestHttpServer::start().await;
    server
        .respond("GET", "/login", responses::with_cookies(&["a=1", "b=2"]))
        .await;

    let response = reqwest::get(server.url_for("/login")).await.unwrap();
    let cookies: Vec<_> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
}

#[tokio::test]
async fn test_redirect_template() {
    let server = TestHttpServer::start().await;
    server.respond("GET", "/old", responses::redirect("/new")).await;
    server.respond("GET", "/new", responses::text("landed")).await;

    let response = reqwest::get(server.url_for("/old")).await.unwrap();
    assert_eq!(response.url().path(), "/new");
    assert_eq!(response.text().await.unwrap(), "landed");
}

#[tokio::test]
async fn test_latency() {
    let server = TestHttpServer::start().await;
    server
        .with_latency("/slow", &serde_json::json!({ "ok": true }), Duration::from_millis(200))
        .await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let result = client.get(server.url_for("/slow")).send().await;
    assert!(result.unwrap_err().is_timeout());
}

#[tokio::test]
async fn test_last_request_and_reset() {
    let server = TestHttpServer::start().await;
    server.echo("/a").await;

    reqwest::get(server.url_for("/a")).await.unwrap();
    let last = server.last_request().await.unwrap();
    assert_eq!(last.url.path(), "/a");

    server.reset().await;
    assert!(server.received_requests().await.is_empty());
}
