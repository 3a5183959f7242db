use apitest_client::{ApiClient, ApiResponse, CookieSerializer, SameSite};
use apitest_test_harness::assert_error_contains;
use apitest_test_harness::mocks::network::{responses, TestHttpServer};
use serde::Deserialize;
use serde_json::json;
use wiremock::ResponseTemplate;

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u32,
    username: String,
}

#[tokio::test]
async fn test_json_response_accessors() {
    apitest_test_harness::init();
    let server = TestHttpServer::start().await;
    server
        .get_json("/users/1", &json!({ "id": 1, "username": "virk", "roles": ["admin", "editor"] }))
        .await;

    let client = ApiClient::new(Some(server.url()));
    let response = client.get("/users/1").await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.status_type(), 2);
    assert_eq!(response.content_type().as_deref(), Some("application/json"));
    assert!(response.has_body());
    assert!(!response.has_error());
    assert_eq!(response.url().path(), "/users/1");
    assert_eq!(response.method(), &apitest_client::Method::GET);
    assert_eq!(
        response.json::<User>().unwrap(),
        User { id: 1, username: "virk".into() }
    );

    response
        .assert_ok()
        .assert_body_contains(json!({ "username": "virk", "roles": ["editor"] }))
        .assert_body_not_contains(json!({ "roles": ["owner"] }))
        .assert_header("content-type", Some("application/json"))
        .assert_header_missing("x-powered-by");
}

#[tokio::test]
async fn test_html_response() {
    let server = TestHttpServer::start().await;
    server
        .respond("GET", "/", responses::html("<h1>Welcome</h1>"))
        .await;

    let response = ApiClient::new(Some(server.url())).get("/").await.unwrap();

    assert_eq!(response.content_type().as_deref(), Some("text/html"));
    assert!(!response.has_body());
    assert!(response.body().is_null());
    response.assert_text_includes("Welcome");
}

#[tokio::test]
async fn test_response_cookies() {
    let server = TestHttpServer::start().await;
    server
        .respond(
            "POST",
            "/login",
            responses::with_cookies(&[
                "session=abc%20123; Path=/; HttpOnly; SameSite=Strict",
                "remember_me=1; Max-Age=60",
            ]),
        )
        .await;

    let response = ApiClient::new(Some(server.url())).post("/login").await.unwrap();

    assert_eq!(response.cookies().len(), 2);
    let session = response.cookie("session").unwrap();
    assert_eq!(session.value, "abc 123");
    assert!(session.http_only);
    assert_eq!(session.same_site, Some(SameSite::Strict));
    assert_eq!(response.cookie("remember_me").unwrap().max_age, Some(60));

    response
        .assert_cookie("session", Some("abc 123"))
        .assert_cookie("remember_me", None)
        .assert_cookie_missing("tracking");
}

struct ReversedCookies;

impl CookieSerializer for ReversedCookies {
    fn process(&self, name: &str, value: &str, response: &ApiResponse) -> Option<String> {
        if name != "payload" || response.status() != 200 {
            return None;
        }
        Some(value.chars().rev().collect())
    }
}

#[tokio::test]
async fn test_cookie_serializer_processes_response_cookies() {
    let server = TestHttpServer::start().await;
    server
        .respond("GET", "/", responses::with_cookies(&["payload=olleh", "plain=x"]))
        .await;

    let mut client = ApiClient::new(Some(server.url()));
    client.cookie_serializer(ReversedCookies);
    let response = client.get("/").await.unwrap();

    response
        .assert_cookie("payload", Some("hello"))
        .assert_cookie("plain", Some("x"));
}

#[tokio::test]
async fn test_links_header() {
    let server = TestHttpServer::start().await;
    server
        .respond(
            "GET",
            "/users",
            ResponseTemplate::new(200)
                .insert_header("Link", "</users?page=2>; rel=\"next\", </users?page=9>; rel=\"last\"")
                .set_body_json(json!([])),
        )
        .await;

    let response = ApiClient::new(Some(server.url())).get("/users").await.unwrap();
    let links = response.links();

    assert_eq!(links["next"], "/users?page=2");
    assert_eq!(links["last"], "/users?page=9");
}

#[tokio::test]
async fn test_multiple_header_values() {
    let server = TestHttpServer::start().await;
    server
        .respond(
            "GET",
            "/",
            ResponseTemplate::new(204)
                .append_header("x-trace", "a")
                .append_header("x-trace", "b"),
        )
        .await;

    let response = ApiClient::new(Some(server.url())).get("/").await.unwrap();
    response.assert_no_content();
    assert_eq!(response.header_all("x-trace"), vec!["a", "b"]);
    assert_eq!(response.text(), "");
}

#[tokio::test]
async fn test_invalid_json_body_is_an_error() {
    let server = TestHttpServer::start().await;
    server
        .respond(
            "GET",
            "/broken",
            ResponseTemplate::new(200).set_body_raw("{not json", "application/json"),
        )
        .await;

    assert_error_contains!(
        ApiClient::new(Some(server.url())).get("/broken").await,
        "failed to parse application/json response (status 200)"
    );
}

#[tokio::test]
async fn test_dumps_are_emitted_once() {
    apitest_test_harness::init();
    let server = TestHttpServer::start().await;
    server.get_json("/users", &json!([{ "id": 1 }])).await;

    let response = ApiClient::new(Some(server.url()))
        .get("/users")
        .dump()
        .await
        .unwrap();

    response.dump_body().dump().dump_headers();
    assert_eq!(response.dumped_sections().len(), 5);
}

#[tokio::test]
#[should_panic(expected = "to contain subset")]
async fn test_body_contains_failure_panics() {
    let server = TestHttpServer::start().await;
    server.get_json("/users", &json!({ "id": 1 })).await;

    ApiClient::new(Some(server.url()))
        .get("/users")
        .await
        .unwrap()
        .assert_body_contains(json!({ "id": 2 }));
}
