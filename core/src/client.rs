//! The request-execution adapter.
//!
//! # Design
//! `NetworkService::dispatch` does all of its own work synchronously: it
//! composes the URL, encodes the body, logs the outgoing request, spawns one
//! task on the runtime and returns a `CancelRequest`. Everything after that
//! happens inside the task. The task alone calls the progress handler and
//! then the completion handler, so progress always precedes completion and
//! completion happens exactly once.
//!
//! Build failures never reach the transport. The completion handler is
//! called with `EncodingError` before `dispatch` returns, and the returned
//! handle is a no-op.

use std::future::Future;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::compose::compose_url;
use crate::config::SessionConfig;
use crate::encoding::{base_request, encode_request};
use crate::error::{EncodingError, ResponseError, SessionError};
use crate::http::{HttpRequest, HttpResponse};
use crate::multipart::{MultipartForm, MultipartParameters};
use crate::request::{Body, Request};
use crate::response::{NetworkResponse, TransferProgress};
use crate::session::{Session, SessionGuard};
use crate::transport::{
    exchange_multipart, exchange_plain, to_transport, transport_headers, ProgressHandler,
};

type LogHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Observers for a dispatched request. Both default to no-ops.
#[derive(Clone)]
pub struct Callbacks {
    on_log: LogHandler,
    on_progress: ProgressHandler,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_log: Arc::new(|_| {}),
            on_progress: Arc::new(|_| {}),
        }
    }
}

impl Callbacks {
    /// Receives one line before dispatch and one after completion.
    pub fn on_log(mut self, on_log: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_log = Arc::new(on_log);
        self
    }

    /// Receives non-decreasing transfer progress, always before completion.
    pub fn on_progress(
        mut self,
        on_progress: impl Fn(TransferProgress) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Arc::new(on_progress);
        self
    }

    /// Logging is best effort: a panicking hook is swallowed.
    fn log(&self, line: String) {
        let on_log = &self.on_log;
        if catch_unwind(AssertUnwindSafe(|| on_log(line))).is_err() {
            tracing::warn!("log hook panicked");
        }
    }

    /// Same contract as `log`: a panicking hook must not keep the request
    /// from completing.
    fn progress(&self, progress: TransferProgress) {
        let on_progress = &self.on_progress;
        if catch_unwind(AssertUnwindSafe(|| on_progress(progress))).is_err() {
            tracing::warn!(completed = progress.completed, "progress hook panicked");
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

/// Handle returned by every dispatch.
///
/// Cancelling before completion makes the request complete with
/// `ResponseError::Cancelled`. Cancelling afterwards, or cancelling the
/// handle of a request that failed to encode, does nothing.
#[derive(Debug, Clone)]
pub struct CancelRequest {
    signal: Option<Arc<watch::Sender<bool>>>,
}

impl CancelRequest {
    pub fn noop() -> Self {
        Self { signal: None }
    }

    fn armed() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Some(Arc::new(signal)),
        }
    }

    pub fn cancel(&self) {
        if let Some(signal) = &self.signal {
            signal.send_replace(true);
        }
    }

    pub fn is_noop(&self) -> bool {
        self.signal.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(|signal| *signal.borrow())
    }

    /// Resolves once `cancel` has been called. Never resolves for a no-op
    /// handle.
    async fn cancelled(&self) {
        match &self.signal {
            Some(signal) => {
                let mut rx = signal.subscribe();
                // The sender lives in `self`, so the channel cannot close.
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            }
            None => std::future::pending().await,
        }
    }
}

/// Future-based view of a dispatch: resolves to the single
/// `NetworkResponse` of the request.
#[derive(Debug)]
pub struct Exchange {
    rx: oneshot::Receiver<NetworkResponse>,
    cancel: CancelRequest,
    url: Url,
}

impl Exchange {
    pub fn canceller(&self) -> CancelRequest {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Future for Exchange {
    type Output = NetworkResponse;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.rx).poll(cx));
        // A dropped sender means the task died with its runtime.
        Poll::Ready(outcome.unwrap_or_else(|_| NetworkResponse::NetworkError {
            error: ResponseError::Aborted,
            response: HttpResponse::no_response(self.url.clone()),
        }))
    }
}

/// A request ready for the transport.
enum Prepared {
    Plain {
        request: reqwest::Request,
        description: String,
    },
    Multipart {
        request: reqwest::Request,
        description: String,
        sent: watch::Receiver<u64>,
        total: u64,
    },
}

impl Prepared {
    fn description(&self) -> &str {
        match self {
            Prepared::Plain { description, .. } | Prepared::Multipart { description, .. } => {
                description
            }
        }
    }
}

/// Adapter from abstract `Request` values to the transport.
#[derive(Debug, Clone)]
pub struct NetworkService {
    base_url: Url,
    session: Session,
    guard: Arc<SessionGuard>,
    runtime: Handle,
}

impl NetworkService {
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use `with_runtime` to
    /// supply one explicitly.
    pub fn new(base_url: Url, session: Session) -> Self {
        Self::with_runtime(base_url, session, Handle::current())
    }

    pub fn with_runtime(base_url: Url, session: Session, runtime: Handle) -> Self {
        Self {
            base_url,
            session,
            guard: Arc::new(SessionGuard::default()),
            runtime,
        }
    }

    /// A service over a fresh session built from `config`, running on the
    /// current Tokio runtime. Fails with `SessionError::NoRuntime` outside
    /// one.
    pub fn with_config(base_url: Url, config: SessionConfig) -> Result<Self, SessionError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(base_url, Session::new(config)?, runtime))
    }

    pub fn with_default_config(base_url: Url) -> Result<Self, SessionError> {
        Self::with_config(base_url, SessionConfig::default())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_guard(&self) -> &SessionGuard {
        &self.guard
    }

    /// Dispatches `request` and returns immediately. `on_completion` is
    /// called exactly once with the outcome.
    pub fn dispatch(
        &self,
        request: Request,
        callbacks: Callbacks,
        on_completion: impl FnOnce(NetworkResponse) + Send + 'static,
    ) -> CancelRequest {
        self.start(request, callbacks, on_completion).0
    }

    /// Dispatches `request` and returns a future for its outcome.
    pub fn send(&self, request: Request, callbacks: Callbacks) -> Exchange {
        let (tx, rx) = oneshot::channel();
        let (cancel, url) = self.start(request, callbacks, move |outcome| {
            let _ = tx.send(outcome);
        });
        Exchange {
            rx,
            cancel,
            url: url.unwrap_or_else(|| self.base_url.clone()),
        }
    }

    /// Shared body of `dispatch` and `send`. Also returns the composed URL,
    /// `None` when the request failed to encode.
    fn start(
        &self,
        request: Request,
        callbacks: Callbacks,
        on_completion: impl FnOnce(NetworkResponse) + Send + 'static,
    ) -> (CancelRequest, Option<Url>) {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!(
            "dispatch",
            %request_id,
            method = %request.method,
            session = %self.session.id(),
        );
        let _entered = span.enter();

        let url = match compose_url(&self.base_url, &request.target, &request.extra_query_items) {
            Ok(url) => url,
            Err(err) => return (self.fail_encoding(err, on_completion), None),
        };
        let prepared = match self.prepare(&request, url.clone()) {
            Ok(prepared) => prepared,
            Err(err) => return (self.fail_encoding(err, on_completion), None),
        };

        callbacks.log(format!("⬆️ {}", prepared.description()));
        tracing::debug!(%url, "dispatching request");

        let cancel = CancelRequest::armed();
        let task = run(
            prepared,
            url.clone(),
            request.success_codes,
            self.session.clone(),
            self.guard.clone(),
            callbacks,
            cancel.clone(),
            on_completion,
        );
        self.runtime.spawn(task.instrument(span.clone()));
        (cancel, Some(url))
    }

    fn prepare(&self, request: &Request, url: Url) -> Result<Prepared, EncodingError> {
        let client = self.session.client();
        match &request.body {
            Body::Plain {
                parameters,
                encoding,
            } => {
                let encoded = encode_request(
                    request.method,
                    url,
                    &request.headers,
                    request.cache_policy,
                    parameters,
                    encoding,
                )?;
                let description = encoded.to_string();
                Ok(Prepared::Plain {
                    request: to_transport(client, encoded)?,
                    description,
                })
            }
            Body::MultipartUpload(parameters) => {
                let base = base_request(request.method, url, &request.headers, request.cache_policy)?;
                let description = format!("{base} multipart ({} parts)", parameters.len());
                let (request, sent, total) = build_multipart(client, base, parameters)?;
                Ok(Prepared::Multipart {
                    request,
                    description,
                    sent,
                    total,
                })
            }
        }
    }

    fn fail_encoding(
        &self,
        err: EncodingError,
        on_completion: impl FnOnce(NetworkResponse),
    ) -> CancelRequest {
        tracing::warn!(error = %err, "request encoding failed");
        on_completion(NetworkResponse::EncodingError(err));
        self.guard.retain(self.session.clone());
        CancelRequest::noop()
    }
}

fn build_multipart(
    client: &reqwest::Client,
    base: HttpRequest,
    parameters: &MultipartParameters,
) -> Result<(reqwest::Request, watch::Receiver<u64>, u64), EncodingError> {
    let form = MultipartForm::build(parameters);
    let total = form.payload_len();
    let (sent_tx, sent_rx) = watch::channel(0);
    let form = form.into_transport(Arc::new(sent_tx))?;
    let headers = transport_headers(&base.headers, base.cache_policy)?;
    let request = client
        .request(base.method.into(), base.url)
        .headers(headers)
        .multipart(form)
        .build()
        .map_err(EncodingError::Request)?;
    Ok((request, sent_rx, total))
}

#[allow(clippy::too_many_arguments)]
async fn run(
    prepared: Prepared,
    url: Url,
    success_codes: Range<u16>,
    session: Session,
    guard: Arc<SessionGuard>,
    callbacks: Callbacks,
    cancel: CancelRequest,
    on_completion: impl FnOnce(NetworkResponse),
) {
    let client = session.client();
    let on_progress = |progress: TransferProgress| callbacks.progress(progress);
    let exchange = async {
        match prepared {
            Prepared::Plain { request, .. } => {
                exchange_plain(client, request, &url, &success_codes, &on_progress).await
            }
            Prepared::Multipart {
                request,
                sent,
                total,
                ..
            } => {
                exchange_multipart(
                    client,
                    request,
                    &url,
                    &success_codes,
                    sent,
                    total,
                    &on_progress,
                )
                .await
            }
        }
    };

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => NetworkResponse::NetworkError {
            error: ResponseError::Cancelled,
            response: HttpResponse::no_response(url.clone()),
        },
        outcome = exchange => outcome,
    };

    match &outcome {
        NetworkResponse::NetworkError { error, .. } => {
            tracing::debug!(status = ?outcome.status(), %error, "request failed");
        }
        _ => tracing::debug!(status = ?outcome.status(), "request completed"),
    }
    if let Some(response) = outcome.response() {
        callbacks.log(format!("📩 {response}"));
    }

    on_completion(outcome);
    guard.retain(session);
}
