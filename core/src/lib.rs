//! Request-execution adapter over an async HTTP transport.
//!
//! # Overview
//! Callers describe a request as plain data (`Request`): method, target,
//! body kind, headers, accepted status range, cache policy and extra query
//! items. `NetworkService` turns that description into a transport request,
//! drives it on a Tokio runtime, and reports exactly one `NetworkResponse`.
//!
//! # Design
//! - URL composition, parameter encoding and multipart construction are pure
//!   and run before anything is sent, so every build failure surfaces as
//!   `NetworkResponse::EncodingError` without touching the network.
//! - `dispatch` is callback based and returns a `CancelRequest` at once;
//!   `send` wraps it as a future.
//! - The transport is `reqwest`. Types that cross the adapter boundary use
//!   owned fields so encoders and tests can inspect them freely.

pub mod client;
pub mod compose;
pub mod config;
pub mod encoding;
pub mod error;
pub mod http;
pub mod multipart;
pub mod request;
pub mod response;
pub mod session;
mod transport;

pub use client::{Callbacks, CancelRequest, Exchange, NetworkService};
pub use compose::compose_url;
pub use config::SessionConfig;
pub use encoding::{CustomEncoding, ParametersEncoding};
pub use error::{BoxError, ConfigError, EncodingError, ResponseError, SessionError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use multipart::{FileParameter, MultipartForm, MultipartParameter, MultipartParameters};
pub use request::{Body, CachePolicy, Parameters, Request, Target};
pub use response::{NetworkResponse, TransferProgress};
pub use session::{Session, SessionGuard};
