use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a locator was rejected before any request was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    ParseError,
    /// No host, e.g. a relative path such as `/remoteEntry.json`
    MissingAuthority,
    MissingScheme,
}

/// Failure of a manifest request, from locator validation to body decoding.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("cannot build request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Only produced when the client was built with a request timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] BoxError),

    #[error("response body exceeds {limit} bytes (got at least {actual})")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Non-2xx status. `body_preview` holds at most the first few KB.
    #[error("remote answered {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The shared request worker is gone.
    #[error("HTTP client is shut down")]
    ServiceClosed,

    /// `reason` is diagnostic text; match on `kind`.
    #[error("invalid locator '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    #[error("scheme '{scheme}' rejected: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// `true` when a response arrived but was unusable, as opposed to the
    /// request never completing.
    #[must_use]
    pub fn is_response_error(&self) -> bool {
        matches!(
            self,
            Self::HttpStatus { .. } | Self::BodyTooLarge { .. } | Self::Json(_)
        )
    }

    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}
