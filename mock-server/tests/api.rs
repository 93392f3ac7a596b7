use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_counter, Echo, ReceivedPart, SharedCounter, Stats};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

// --- home ---

#[tokio::test]
async fn home_returns_html() {
    let resp = app().oneshot(empty_request("GET", "/")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("Example Domain"));
}

// --- echo ---

#[tokio::test]
async fn get_echoes_query_pairs_in_order() {
    let resp = app()
        .oneshot(empty_request("GET", "/get?b=2&a=1&b=3"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "GET");
    assert_eq!(
        echo.args,
        vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "3".to_string()),
        ]
    );
}

#[tokio::test]
async fn post_echoes_json_body() {
    let resp = app()
        .oneshot(json_request("POST", "/post", r#"{"name":"test"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.json.unwrap()["name"], "test");
    assert!(echo
        .headers
        .iter()
        .any(|(name, value)| name == "content-type" && value == "application/json"));
}

#[tokio::test]
async fn post_keeps_raw_form_body() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/post")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body("a=1&b=2".to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.data, "a=1&b=2");
    assert!(echo.json.is_none());
}

#[tokio::test]
async fn get_route_rejects_post() {
    let resp = app().oneshot(empty_request("POST", "/get")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn anything_accepts_every_method() {
    for method in ["GET", "PUT", "PATCH", "DELETE", "OPTIONS"] {
        let resp = app()
            .oneshot(empty_request(method, "/anything/nested/path"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{method}");
        let echo: Echo = body_json(resp).await;
        assert_eq!(echo.method, method);
        assert_eq!(echo.url, "/anything/nested/path");
    }
}

// --- status ---

#[tokio::test]
async fn status_returns_requested_code_with_body() {
    let resp = app().oneshot(empty_request("GET", "/status/404")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(resp).await, "status 404");
}

#[tokio::test]
async fn status_204_has_empty_body() {
    let resp = app().oneshot(empty_request("GET", "/status/204")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn status_rejects_non_numeric_code() {
    let resp = app().oneshot(empty_request("GET", "/status/abc")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- bytes / delay ---

#[tokio::test]
async fn bytes_returns_requested_length() {
    let resp = app().oneshot(empty_request("GET", "/bytes/1000")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await.len(), 1000);
}

#[tokio::test]
async fn delay_eventually_answers() {
    let resp = app().oneshot(empty_request("GET", "/delay/10")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "done");
}

// --- upload ---

#[tokio::test]
async fn upload_lists_received_parts() {
    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"name\"\r\n\r\n\
         test\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         hello\r\n\
         --{boundary}--\r\n"
    );
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    http::header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let parts: Vec<ReceivedPart> = body_json(resp).await;
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "name");
    assert_eq!(parts[0].text.as_deref(), Some("test"));
    assert!(parts[0].file_name.is_none());
    assert_eq!(parts[1].file_name.as_deref(), Some("a.txt"));
    assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
    assert_eq!(parts[1].len, 5);
    assert!(parts[1].text.is_none());
}

#[tokio::test]
async fn upload_without_multipart_body_is_rejected() {
    let resp = app()
        .oneshot(json_request("POST", "/upload", "{}"))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

// --- stats ---

#[tokio::test]
async fn stats_counts_handled_requests_but_not_itself() {
    let counter = SharedCounter::default();
    let router = app_with_counter(counter.clone());

    router.clone().oneshot(empty_request("GET", "/get")).await.unwrap();
    router.clone().oneshot(empty_request("GET", "/status/500")).await.unwrap();
    let resp = router.oneshot(empty_request("GET", "/stats")).await.unwrap();

    let stats: Stats = body_json(resp).await;
    assert_eq!(stats.hits, 2);
    assert_eq!(counter.hits(), 2);
}
