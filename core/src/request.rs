//! The abstract, transport-agnostic request description.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::encoding::ParametersEncoding;
use crate::http::HttpMethod;
use crate::multipart::MultipartParameters;

/// Request parameters. A JSON object keeps arbitrary nesting and
/// serializes directly for the JSON encoding.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An absolute URL, used as-is.
    Full(Url),
    /// A path resolved against the service's base URL.
    Endpoint(String),
}

impl From<Url> for Target {
    fn from(url: Url) -> Self {
        Target::Full(url)
    }
}

impl From<&str> for Target {
    fn from(endpoint: &str) -> Self {
        Target::Endpoint(endpoint.to_string())
    }
}

/// What the request carries.
#[derive(Debug, Clone)]
pub enum Body {
    Plain {
        parameters: Parameters,
        encoding: ParametersEncoding,
    },
    MultipartUpload(MultipartParameters),
}

impl Default for Body {
    fn default() -> Self {
        Body::Plain {
            parameters: Parameters::new(),
            encoding: ParametersEncoding::UrlEncoded,
        }
    }
}

/// Cache behaviour requested for an exchange. The transport has no HTTP
/// cache of its own, so policies are expressed as request headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    UseProtocolCachePolicy,
    ReloadIgnoringCacheData,
    ReturnCacheDataElseLoad,
    ReturnCacheDataDontLoad,
}

impl CachePolicy {
    pub fn headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            CachePolicy::UseProtocolCachePolicy => &[],
            CachePolicy::ReloadIgnoringCacheData => {
                &[("Cache-Control", "no-cache"), ("Pragma", "no-cache")]
            }
            CachePolicy::ReturnCacheDataElseLoad => &[("Cache-Control", "max-stale")],
            CachePolicy::ReturnCacheDataDontLoad => &[("Cache-Control", "only-if-cached")],
        }
    }
}

/// A request as described by the caller. Immutable once handed to
/// `NetworkService::dispatch`.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    pub target: Target,
    pub body: Body,
    pub headers: Vec<(String, String)>,
    /// Half-open range of status codes treated as success.
    pub success_codes: Range<u16>,
    pub cache_policy: CachePolicy,
    /// Appended to the final URL's query, after any existing pairs.
    pub extra_query_items: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: HttpMethod, target: impl Into<Target>, body: Body) -> Self {
        Self {
            method,
            target: target.into(),
            body,
            headers: Vec::new(),
            success_codes: 200..300,
            cache_policy: CachePolicy::default(),
            extra_query_items: Vec::new(),
        }
    }

    pub fn get(target: impl Into<Target>) -> Self {
        Self::new(HttpMethod::Get, target, Body::default())
    }

    pub fn post(
        target: impl Into<Target>,
        parameters: Parameters,
        encoding: ParametersEncoding,
    ) -> Self {
        Self::new(HttpMethod::Post, target, Body::Plain { parameters, encoding })
    }

    pub fn put(
        target: impl Into<Target>,
        parameters: Parameters,
        encoding: ParametersEncoding,
    ) -> Self {
        Self::new(HttpMethod::Put, target, Body::Plain { parameters, encoding })
    }

    pub fn delete(target: impl Into<Target>) -> Self {
        Self::new(HttpMethod::Delete, target, Body::default())
    }

    /// A `POST` multipart form upload.
    pub fn upload(target: impl Into<Target>, parameters: MultipartParameters) -> Self {
        Self::new(HttpMethod::Post, target, Body::MultipartUpload(parameters))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_success_codes(mut self, codes: Range<u16>) -> Self {
        self.success_codes = codes;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_query_item(mut self, name: &str, value: &str) -> Self {
        self.extra_query_items
            .push((name.to_string(), value.to_string()));
        self
    }
}
