use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use tower::buffer::Buffer;

use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;

pub(crate) type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

pub(crate) type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Manifest client shared by every mount boundary of a host.
///
/// Clones share one connection pool and one request worker.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl HttpClient {
    /// # Errors
    /// See [`HttpClientBuilder::build`].
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Starts a GET for an absolute locator.
    pub fn get(&self, locator: &str) -> RequestBuilder {
        RequestBuilder::new(self, http::Method::GET, locator)
    }

    #[must_use]
    pub fn transport_security(&self) -> TransportSecurity {
        self.transport_security
    }
}

/// The buffer forwards inner errors boxed; anything else means its worker is gone.
pub(crate) fn unbuffer_error(err: tower::BoxError) -> HttpError {
    err.downcast::<HttpError>().map_or_else(
        |err| {
            tracing::error!(error = %err, "manifest request worker stopped");
            HttpError::ServiceClosed
        },
        |inner| *inner,
    )
}
