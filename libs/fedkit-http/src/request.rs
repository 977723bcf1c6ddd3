use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::Full;
use tower::{Service, ServiceExt};

use crate::client::{BufferedService, HttpClient, unbuffer_error};
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;

/// Pending request returned by [`HttpClient::get`].
///
/// A bad header is remembered and surfaces from [`send`](Self::send).
#[must_use = "a request is only issued by .send()"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    transport: TransportSecurity,
    method: Method,
    locator: String,
    headers: Result<Vec<(HeaderName, HeaderValue)>, HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: &HttpClient, method: Method, locator: &str) -> Self {
        Self {
            service: client.service.clone(),
            max_body_size: client.max_body_size,
            transport: client.transport_security,
            method,
            locator: locator.to_owned(),
            headers: Ok(Vec::new()),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Ok(headers) = &mut self.headers {
            match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
                (Ok(name), Ok(value)) => headers.push((name, value)),
                (Err(err), _) => self.headers = Err(err.into()),
                (_, Err(err)) => self.headers = Err(err.into()),
            }
        }
        self
    }

    /// Issues the request. Every status comes back as `Ok`; the checked
    /// readers on [`HttpResponse`] turn non-2xx into errors.
    ///
    /// # Errors
    /// An invalid header or locator, a scheme the transport forbids, a
    /// transport failure, or an elapsed request timeout.
    pub async fn send(self) -> Result<HttpResponse, HttpError> {
        let headers = self.headers?;
        let uri = parse_locator(&self.locator, self.transport)?;

        let request = headers
            .into_iter()
            .fold(Request::builder().method(self.method).uri(uri), |req, (k, v)| {
                req.header(k, v)
            })
            .body(Full::new(Bytes::new()))?;

        let mut service = self.service;
        let inner = service
            .ready()
            .await
            .map_err(unbuffer_error)?
            .call(request)
            .await
            .map_err(unbuffer_error)?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}

fn invalid(locator: &str, kind: InvalidUriKind, reason: impl Into<String>) -> HttpError {
    HttpError::InvalidUri {
        url: locator.to_owned(),
        kind,
        reason: reason.into(),
    }
}

/// Accepts absolute `https://` locators, plus `http://` when the transport allows it.
fn parse_locator(locator: &str, transport: TransportSecurity) -> Result<Uri, HttpError> {
    let uri: Uri = locator.parse().map_err(|e: http::uri::InvalidUri| {
        invalid(locator, InvalidUriKind::ParseError, e.to_string())
    })?;

    if uri.authority().is_none() {
        return Err(invalid(locator, InvalidUriKind::MissingAuthority, "no host"));
    }

    let scheme = uri
        .scheme_str()
        .ok_or_else(|| invalid(locator, InvalidUriKind::MissingScheme, "no scheme"))?;
    let reason = match (scheme, transport) {
        ("https", _) | ("http", TransportSecurity::AllowInsecureHttp) => return Ok(uri),
        ("http", _) => "plain http is disabled for this client",
        _ => "manifests are fetched over http or https only",
    };
    Err(HttpError::InvalidScheme {
        scheme: scheme.to_owned(),
        reason: reason.to_owned(),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::HttpClientConfig;
    use crate::HttpClientBuilder;

    #[test]
    fn relative_locator_has_no_authority() {
        let err = parse_locator("/remoteEntry.json", TransportSecurity::AllowInsecureHttp)
            .unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::MissingAuthority,
                ..
            }
        ));
    }

    #[test]
    fn http_needs_insecure_transport() {
        let locator = "http://localhost:3001/remoteEntry.json";
        assert!(parse_locator(locator, TransportSecurity::AllowInsecureHttp).is_ok());
        assert!(matches!(
            parse_locator(locator, TransportSecurity::TlsOnly),
            Err(HttpError::InvalidScheme { ref scheme, .. }) if scheme == "http"
        ));
    }

    #[test]
    fn other_schemes_are_rejected() {
        let result = parse_locator(
            "ftp://example.com/remoteEntry.json",
            TransportSecurity::AllowInsecureHttp,
        );
        assert!(matches!(
            result,
            Err(HttpError::InvalidScheme { ref scheme, .. }) if scheme == "ftp"
        ));
    }

    #[tokio::test]
    async fn bad_header_surfaces_on_send() {
        let client = HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .build()
            .unwrap();
        let err = client
            .get("http://localhost:3001/remoteEntry.json")
            .header("bad header", "value")
            .header("accept", "application/json")
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderName(_)));
    }
}
