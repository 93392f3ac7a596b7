//! Drives the transport for one exchange and normalizes what it returns.
//!
//! Everything here runs inside the task spawned by `NetworkService::dispatch`,
//! so progress callbacks and the terminal outcome are produced by the same
//! task, in order.

use std::ops::Range;
use std::sync::Arc;

use bytes::BytesMut;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::watch;
use url::Url;

use crate::encoding::header_map;
use crate::error::{EncodingError, ResponseError};
use crate::http::{HttpRequest, HttpResponse};
use crate::request::CachePolicy;
use crate::response::{NetworkResponse, TransferProgress};

pub(crate) type ProgressFn = dyn Fn(TransferProgress) + Send + Sync;
pub(crate) type ProgressHandler = Arc<ProgressFn>;

/// Builds the transport request for an encoded plain request.
pub(crate) fn to_transport(
    client: &reqwest::Client,
    request: HttpRequest,
) -> Result<reqwest::Request, EncodingError> {
    let headers = transport_headers(&request.headers, request.cache_policy)?;
    let mut builder = client
        .request(request.method.into(), request.url)
        .headers(headers);
    if let Some(body) = request.body {
        builder = builder.body(body);
    }
    builder.build().map_err(EncodingError::Request)
}

/// Request headers plus the headers expressing `cache_policy`. Headers the
/// caller set explicitly win over the policy.
pub(crate) fn transport_headers(
    headers: &[(String, String)],
    cache_policy: CachePolicy,
) -> Result<HeaderMap, EncodingError> {
    let mut map = header_map(headers)?;
    for (name, value) in cache_policy.headers() {
        map.entry(*name).or_insert(HeaderValue::from_static(value));
    }
    Ok(map)
}

/// Sends a plain request, reporting download progress while the body
/// arrives.
pub(crate) async fn exchange_plain(
    client: &reqwest::Client,
    request: reqwest::Request,
    url: &Url,
    success_codes: &Range<u16>,
    on_progress: &(dyn Fn(TransferProgress) + Send + Sync + '_),
) -> NetworkResponse {
    match client.execute(request).await {
        Ok(response) => read_response(response, success_codes, Some(on_progress)).await,
        Err(err) => transport_failure(err, url),
    }
}

/// Sends a multipart upload, forwarding upload progress published by the
/// streamed parts until the transport yields a response.
pub(crate) async fn exchange_multipart(
    client: &reqwest::Client,
    request: reqwest::Request,
    url: &Url,
    success_codes: &Range<u16>,
    mut sent: watch::Receiver<u64>,
    total: u64,
    on_progress: &(dyn Fn(TransferProgress) + Send + Sync + '_),
) -> NetworkResponse {
    let mut forwarded = 0;
    let mut forward = |completed: u64| {
        if completed > forwarded {
            forwarded = completed;
            on_progress(TransferProgress {
                completed,
                total: Some(total),
            });
        }
    };

    let send = client.execute(request);
    tokio::pin!(send);
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            Ok(()) = sent.changed() => {
                let completed = *sent.borrow_and_update();
                forward(completed);
            }
        }
    };
    let completed = *sent.borrow();
    forward(completed);

    match result {
        Ok(response) => read_response(response, success_codes, None).await,
        Err(err) => transport_failure(err, url),
    }
}

async fn read_response(
    mut response: reqwest::Response,
    success_codes: &Range<u16>,
    on_progress: Option<&(dyn Fn(TransferProgress) + Send + Sync + '_)>,
) -> NetworkResponse {
    let status = response.status().as_u16();
    let url = response.url().clone();
    let headers = header_pairs(response.headers());
    let total = response.content_length();

    let mut body = BytesMut::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                body.extend_from_slice(&chunk);
                if let Some(on_progress) = on_progress {
                    on_progress(TransferProgress {
                        completed: body.len() as u64,
                        total,
                    });
                }
            }
            Ok(None) => break,
            Err(err) => {
                return NetworkResponse::NetworkError {
                    error: ResponseError::Body(err),
                    response: HttpResponse {
                        status: Some(status),
                        body: body.freeze(),
                        url,
                        headers,
                    },
                }
            }
        }
    }

    let response = HttpResponse {
        status: Some(status),
        body: body.freeze(),
        url,
        headers,
    };
    validate(response, success_codes)
}

/// Applies the accepted status range. Out-of-range responses are network
/// errors even when they carry a body.
fn validate(response: HttpResponse, success_codes: &Range<u16>) -> NetworkResponse {
    match response.status {
        Some(status) if !success_codes.contains(&status) => NetworkResponse::NetworkError {
            error: ResponseError::UnacceptableStatus {
                status,
                accepted: success_codes.clone(),
            },
            response,
        },
        _ => NetworkResponse::Success {
            body: (!response.body.is_empty()).then(|| response.body.clone()),
            response,
        },
    }
}

fn transport_failure(err: reqwest::Error, url: &Url) -> NetworkResponse {
    let mut response = HttpResponse::no_response(url.clone());
    if let Some(status) = err.status() {
        response.status = Some(status.as_u16());
    }
    NetworkResponse::NetworkError {
        error: ResponseError::Transport(err),
        response,
    }
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
