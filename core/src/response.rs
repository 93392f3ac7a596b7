//! The normalized outcome of a dispatched request.

use bytes::Bytes;

use crate::error::{EncodingError, ResponseError};
use crate::http::HttpResponse;

/// Exactly one of these is delivered per dispatched request.
#[derive(Debug)]
pub enum NetworkResponse {
    /// Status in the accepted range and no transport error. `body` is `None`
    /// when the response carried no bytes, e.g. `204 No Content`.
    Success {
        body: Option<Bytes>,
        response: HttpResponse,
    },
    /// The request could not be built; the transport was never contacted.
    EncodingError(EncodingError),
    /// The transport failed, the request was cancelled, or the status was
    /// outside the accepted range.
    NetworkError {
        error: ResponseError,
        response: HttpResponse,
    },
}

impl NetworkResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, NetworkResponse::Success { .. })
    }

    /// The wire-level response, absent only for encoding errors.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            NetworkResponse::Success { response, .. }
            | NetworkResponse::NetworkError { response, .. } => Some(response),
            NetworkResponse::EncodingError(_) => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response().and_then(|response| response.status)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NetworkResponse::Success { .. } => "success",
            NetworkResponse::EncodingError(_) => "encoding_error",
            NetworkResponse::NetworkError { .. } => "network_error",
        }
    }
}

/// Bytes transferred so far. `total` is unknown when the peer did not
/// announce a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub completed: u64,
    pub total: Option<u64>,
}

impl TransferProgress {
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some(self.completed as f64 / total as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn response(status: Option<u16>) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::new(),
            url: Url::parse("http://localhost/").unwrap(),
            headers: Vec::new(),
        }
    }

    #[test]
    fn success_exposes_status() {
        let outcome = NetworkResponse::Success {
            body: None,
            response: response(Some(204)),
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.status(), Some(204));
        assert_eq!(outcome.kind(), "success");
    }

    #[test]
    fn encoding_error_has_no_response() {
        let outcome = NetworkResponse::EncodingError(EncodingError::Custom("x".into()));
        assert!(outcome.response().is_none());
        assert!(outcome.status().is_none());
        assert_eq!(outcome.kind(), "encoding_error");
    }

    #[test]
    fn network_error_without_status_line() {
        let outcome = NetworkResponse::NetworkError {
            error: ResponseError::Cancelled,
            response: response(None),
        };
        assert!(!outcome.is_success());
        assert!(outcome.response().is_some());
        assert!(outcome.status().is_none());
    }

    #[test]
    fn progress_fraction() {
        let half = TransferProgress {
            completed: 5,
            total: Some(10),
        };
        assert_eq!(half.fraction(), Some(0.5));
        let unknown = TransferProgress {
            completed: 5,
            total: None,
        };
        assert!(unknown.fraction().is_none());
    }
}
