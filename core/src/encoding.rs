//! Parameter encoding: turns a base request plus parameters into a
//! transport-ready `HttpRequest`.
//!
//! # Design
//! Encoding is a pure step that runs strictly before dispatch. Every failure
//! becomes an `EncodingError`, which the adapter reports without contacting
//! the transport. Caller-defined encodings plug in through the
//! `CustomEncoding` trait; closures implement it directly.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use url::form_urlencoded;
use url::Url;

use crate::error::{BoxError, EncodingError};
use crate::http::{HttpMethod, HttpRequest};
use crate::request::{CachePolicy, Parameters};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A caller-supplied encoder. Receives the base request (method, URL,
/// headers and cache policy already set) and returns the encoded request.
/// Implementations should be free of side effects.
pub trait CustomEncoding: Send + Sync {
    fn encode(&self, request: HttpRequest, parameters: &Parameters)
        -> Result<HttpRequest, BoxError>;
}

impl<F> CustomEncoding for F
where
    F: Fn(HttpRequest, &Parameters) -> Result<HttpRequest, BoxError> + Send + Sync,
{
    fn encode(
        &self,
        request: HttpRequest,
        parameters: &Parameters,
    ) -> Result<HttpRequest, BoxError> {
        self(request, parameters)
    }
}

/// How plain-request parameters are put on the wire.
#[derive(Clone, Default)]
pub enum ParametersEncoding {
    /// Query string for GET, HEAD and DELETE; form body otherwise.
    #[default]
    UrlEncoded,
    /// JSON object body.
    Json,
    Custom(Arc<dyn CustomEncoding>),
}

impl ParametersEncoding {
    pub fn custom(encoding: impl CustomEncoding + 'static) -> Self {
        ParametersEncoding::Custom(Arc::new(encoding))
    }

    pub fn from_fn<F>(encode: F) -> Self
    where
        F: Fn(HttpRequest, &Parameters) -> Result<HttpRequest, BoxError> + Send + Sync + 'static,
    {
        Self::custom(encode)
    }
}

impl fmt::Debug for ParametersEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParametersEncoding::UrlEncoded => f.write_str("UrlEncoded"),
            ParametersEncoding::Json => f.write_str("Json"),
            ParametersEncoding::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Builds the base request and applies `encoding` to it.
pub fn encode_request(
    method: HttpMethod,
    url: Url,
    headers: &[(String, String)],
    cache_policy: CachePolicy,
    parameters: &Parameters,
    encoding: &ParametersEncoding,
) -> Result<HttpRequest, EncodingError> {
    let base = base_request(method, url, headers, cache_policy)?;
    match encoding {
        ParametersEncoding::UrlEncoded => Ok(url_encode(base, parameters)),
        ParametersEncoding::Json => json_encode(base, parameters),
        ParametersEncoding::Custom(custom) => custom
            .encode(base, parameters)
            .map_err(EncodingError::Custom),
    }
}

/// A request with method, URL, validated headers and cache policy, and no
/// body yet.
pub fn base_request(
    method: HttpMethod,
    url: Url,
    headers: &[(String, String)],
    cache_policy: CachePolicy,
) -> Result<HttpRequest, EncodingError> {
    header_map(headers)?;
    let mut request = HttpRequest::new(method, url);
    request.headers = headers.to_vec();
    request.cache_policy = cache_policy;
    Ok(request)
}

fn url_encode(mut request: HttpRequest, parameters: &Parameters) -> HttpRequest {
    if parameters.is_empty() {
        return request;
    }

    let pairs = query_components(parameters);
    if request.method.encodes_parameters_in_url() {
        request.url.query_pairs_mut().extend_pairs(pairs);
    } else {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        request.set_default_header("Content-Type", FORM_CONTENT_TYPE);
        request.body = Some(Bytes::from(body));
    }
    request
}

fn json_encode(
    mut request: HttpRequest,
    parameters: &Parameters,
) -> Result<HttpRequest, EncodingError> {
    let body = serde_json::to_vec(parameters)?;
    request.set_default_header("Content-Type", JSON_CONTENT_TYPE);
    request.body = Some(Bytes::from(body));
    Ok(request)
}

/// Flattens parameters into ordered key/value pairs. Keys are sorted, arrays
/// become `key[]`, objects become `key[sub]`, booleans `1`/`0`, null empty.
pub fn query_components(parameters: &Parameters) -> Vec<(String, String)> {
    let mut keys: Vec<&String> = parameters.keys().collect();
    keys.sort();

    let mut components = Vec::new();
    for key in keys {
        flatten(key.clone(), &parameters[key.as_str()], &mut components);
    }
    components
}

fn flatten(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            let mut nested: Vec<&String> = map.keys().collect();
            nested.sort();
            for nested_key in nested {
                flatten(
                    format!("{key}[{nested_key}]"),
                    &map[nested_key.as_str()],
                    out,
                );
            }
        }
        Value::Array(values) => {
            for value in values {
                flatten(format!("{key}[]"), value, out);
            }
        }
        Value::Bool(flag) => out.push((key, if *flag { "1" } else { "0" }.to_string())),
        Value::Null => out.push((key, String::new())),
        Value::Number(number) => out.push((key, number.to_string())),
        Value::String(text) => out.push((key, text.clone())),
    }
}

/// Converts owned header pairs into the transport's header map, rejecting
/// names or values that are not valid HTTP.
pub(crate) fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, EncodingError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || EncodingError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.append(header_name, header_value);
    }
    Ok(map)
}
