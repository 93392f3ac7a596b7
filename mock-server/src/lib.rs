use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Multipart, OriginalUri, Path, Query, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Echo of an incoming request, modelled on httpbin's `/anything` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub url: String,
    pub args: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
}

/// One part of a multipart upload as seen by the server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceivedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
    /// Part body, only for parts without a filename.
    pub text: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stats {
    pub hits: usize,
}

#[derive(Debug, Default)]
pub struct Counter {
    hits: AtomicUsize,
}

impl Counter {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub type SharedCounter = Arc<Counter>;

pub fn app() -> Router {
    app_with_counter(SharedCounter::default())
}

/// Builds the router around an externally owned counter so tests can read
/// the number of handled requests without going through `/stats`.
pub fn app_with_counter(counter: SharedCounter) -> Router {
    let counted = Router::new()
        .route("/", get(home))
        .route("/get", get(echo))
        .route("/post", post(echo))
        .route("/anything", any(echo))
        .route("/anything/{*rest}", any(echo))
        .route("/status/{code}", any(status))
        .route("/delay/{millis}", any(delay))
        .route("/bytes/{count}", get(bytes))
        .route("/upload", post(upload).put(upload))
        .layer(middleware::from_fn_with_state(counter.clone(), count_hits));

    Router::new()
        .route("/stats", get(stats))
        .merge(counted)
        .with_state(counter)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_counter(
    listener: TcpListener,
    counter: SharedCounter,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_counter(counter)).await
}

async fn count_hits(State(counter): State<SharedCounter>, request: Request, next: Next) -> Response {
    counter.hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn stats(State(counter): State<SharedCounter>) -> Json<Stats> {
    Json(Stats {
        hits: counter.hits(),
    })
}

async fn home() -> Html<&'static str> {
    Html("<!doctype html><html><head><title>Example Domain</title></head><body><h1>Example Domain</h1></body></html>")
}

async fn echo(
    method: Method,
    OriginalUri(uri): OriginalUri,
    Query(args): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        url: uri.to_string(),
        args,
        headers: header_pairs(&headers),
        data: String::from_utf8_lossy(&body).into_owned(),
        json: serde_json::from_slice(&body).ok(),
    })
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) if status == StatusCode::NO_CONTENT => status.into_response(),
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn delay(Path(millis): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    "done"
}

async fn bytes(Path(count): Path<usize>) -> Vec<u8> {
    (0..count).map(|i| (i % 251) as u8).collect()
}

async fn upload(mut multipart: Multipart) -> Result<Json<Vec<ReceivedPart>>, StatusCode> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        let text = match file_name {
            Some(_) => None,
            None => Some(String::from_utf8_lossy(&data).into_owned()),
        };
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            len: data.len(),
            text,
        });
    }
    Ok(Json(parts))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
