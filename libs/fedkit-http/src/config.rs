use std::time::Duration;

/// Sent when the host configures no user agent of its own.
pub const DEFAULT_USER_AGENT: &str = concat!("fedkit-http/", env!("CARGO_PKG_VERSION"));

/// Where trust anchors for `https://` locators come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Bundled Mozilla roots.
    #[default]
    WebPki,
    /// The operating system store.
    Native,
}

/// Whether `http://` locators are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    #[default]
    TlsOnly,
    /// For remotes served from localhost during development.
    AllowInsecureHttp,
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// `None` leaves a slow fetch pending, and its mount keeps showing the placeholder.
    pub request_timeout: Option<Duration>,
    pub max_body_size: usize,
    pub user_agent: String,
    pub transport: TransportSecurity,
    pub tls_roots: TlsRootConfig,
    /// Fetches waiting for the request worker before callers are held back.
    pub buffer_capacity: usize,
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_body_size: 1 << 20,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
            buffer_capacity: 64,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 8,
        }
    }
}

impl HttpClientConfig {
    /// Plain HTTP against local mock servers, each request bounded to 5s.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(5)),
            transport: TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: None,
            ..Self::default()
        }
    }
}
