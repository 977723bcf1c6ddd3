use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::error::HttpError;

const PREVIEW_LIMIT: usize = 8 * 1024;

/// Decompressed response body.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Response to a manifest request. Every body read is capped at the
/// client's `max_body_size`, counted after decompression.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Body regardless of status.
    ///
    /// # Errors
    /// `HttpError::BodyTooLarge` past the limit, `HttpError::Transport` if the stream breaks.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        collect_capped(self.inner.into_body(), self.max_body_size).await
    }

    /// Body of a 2xx response.
    ///
    /// # Errors
    /// `HttpError::HttpStatus` for any other status, carrying a short body preview,
    /// plus the errors of [`bytes`](Self::bytes).
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        let status = self.inner.status();
        if status.is_success() {
            return self.bytes().await;
        }

        let content_type = self
            .inner
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let limit = self.max_body_size.min(PREVIEW_LIMIT);
        let body_preview = match collect_capped(self.inner.into_body(), limit).await {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(err) => return Err(err),
        };
        Err(HttpError::HttpStatus {
            status,
            body_preview,
            content_type,
        })
    }

    /// Decodes a 2xx body as JSON.
    ///
    /// # Errors
    /// The errors of [`checked_bytes`](Self::checked_bytes), or `HttpError::Json`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = self.checked_bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn collect_capped(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(body);
    let mut collected = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        let Some(chunk) = frame.data_ref() else {
            continue;
        };
        let total = collected.len() + chunk.len();
        if total > limit {
            return Err(HttpError::BodyTooLarge {
                limit,
                actual: total,
            });
        }
        collected.extend_from_slice(chunk);
    }

    Ok(collected.freeze())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn response(status: StatusCode, body: &'static str, limit: usize) -> HttpResponse {
        let body: ResponseBody = Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|never| match never {})
            .boxed();
        let inner = Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "text/html")
            .body(body)
            .unwrap();
        HttpResponse {
            inner,
            max_body_size: limit,
        }
    }

    #[tokio::test]
    async fn body_within_limit_is_returned() {
        let body = response(StatusCode::OK, "{}", 2).checked_bytes().await.unwrap();
        assert_eq!(&body[..], b"{}");
    }

    #[tokio::test]
    async fn error_status_keeps_content_type() {
        let err = response(StatusCode::BAD_GATEWAY, "<html>", 1024)
            .checked_bytes()
            .await
            .unwrap_err();
        match err {
            HttpError::HttpStatus {
                status,
                content_type,
                body_preview,
            } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(content_type.as_deref(), Some("text/html"));
                assert_eq!(body_preview, "<html>");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_error_body_still_reports_status() {
        let err = response(StatusCode::INTERNAL_SERVER_ERROR, "0123456789", 4)
            .checked_bytes()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HttpError::HttpStatus { ref body_preview, .. }
                if body_preview == "<body too large for preview>"
        ));
    }

    #[tokio::test]
    async fn malformed_json_is_reported() {
        let err = response(StatusCode::OK, "{not json", 1024)
            .json::<serde_json::Value>()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Json(_)));
    }
}
