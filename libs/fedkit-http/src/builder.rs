use std::time::Duration;

use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

use crate::client::{BufferedService, HttpClient};
use crate::config::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::UserAgentLayer;
use crate::response::ResponseBody;
use crate::tls;

type ManifestService =
    BoxCloneService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HttpError>;

/// Assembles an [`HttpClient`] from an [`HttpClientConfig`].
#[derive(Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Upper bound on a decompressed manifest body.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Number of fetches that may queue for the worker. Never below 1.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// Spawns the request worker, so a tokio runtime must be running.
    ///
    /// # Errors
    /// `HttpError::Tls` if the trust roots cannot be loaded and
    /// `HttpError::InvalidHeaderValue` for an unusable user agent.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let HttpClientConfig {
            request_timeout,
            max_body_size,
            user_agent,
            transport,
            tls_roots,
            buffer_capacity,
            pool_idle_timeout,
            pool_max_idle_per_host,
        } = self.config;

        if transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                target: "fedkit_http::security",
                "plain http:// manifest locators are accepted"
            );
        }

        let connector = tls::https_connector(tls_roots, transport)?;
        let mut pool = Client::builder(TokioExecutor::new());
        pool.pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .pool_idle_timeout(pool_idle_timeout);
        let hyper_client = pool.build::<_, Full<Bytes>>(connector);

        // Outer to inner: Buffer, Timeout (optional), UserAgent, Decompression, hyper.
        let stack = ServiceBuilder::new()
            .layer(UserAgentLayer::try_new(&user_agent)?)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(box_body)
            .map_err(HttpError::from);

        let service: ManifestService = if let Some(limit) = request_timeout {
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(limit))
                .service(stack)
                .map_err(move |err: tower::BoxError| flatten_error(err, limit))
                .boxed_clone()
        } else {
            stack.boxed_clone()
        };

        let service: BufferedService = Buffer::new(service, buffer_capacity.max(1));
        Ok(HttpClient {
            service,
            max_body_size,
            transport_security: transport,
        })
    }
}

fn flatten_error(err: tower::BoxError, limit: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(limit);
    }
    err.downcast::<HttpError>()
        .map_or_else(HttpError::Transport, |inner| *inner)
}

fn box_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;

    #[test]
    fn new_builder_starts_from_default_config() {
        let builder = HttpClientBuilder::new();
        assert!(builder.config.request_timeout.is_none());
        assert_eq!(builder.config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.config.transport, TransportSecurity::TlsOnly);
    }

    #[test]
    fn setters_land_in_config() {
        let builder = HttpClientBuilder::new()
            .timeout(Duration::from_secs(3))
            .user_agent("federation-host/1.0")
            .max_body_size(2048)
            .transport(TransportSecurity::AllowInsecureHttp)
            .tls_roots(TlsRootConfig::Native)
            .buffer_capacity(0);

        assert_eq!(builder.config.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(builder.config.user_agent, "federation-host/1.0");
        assert_eq!(builder.config.max_body_size, 2048);
        assert_eq!(builder.config.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(builder.config.tls_roots, TlsRootConfig::Native);
        assert_eq!(builder.config.buffer_capacity, 1);
    }

    #[test]
    fn elapsed_becomes_timeout_with_configured_limit() {
        let err: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(
            flatten_error(err, Duration::from_secs(2)),
            HttpError::Timeout(d) if d == Duration::from_secs(2)
        ));
    }

    #[test]
    fn inner_http_error_survives_timeout_layer() {
        let err: tower::BoxError = Box::new(HttpError::ServiceClosed);
        assert!(matches!(
            flatten_error(err, Duration::from_secs(2)),
            HttpError::ServiceClosed
        ));
    }

    #[tokio::test]
    async fn unusable_user_agent_fails_build() {
        let result = HttpClientBuilder::new().user_agent("bad\nagent").build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }
}
