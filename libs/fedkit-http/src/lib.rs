#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Manifest fetching client for the federation runtime.
//!
//! A hyper client behind a small tower stack: user agent injection,
//! transparent gzip/br/deflate decoding, an optional request timeout and a
//! shared buffer worker. Bodies are capped after decompression. Failed
//! fetches are never retried here.
//!
//! ```ignore
//! let client = fedkit_http::HttpClient::builder()
//!     .user_agent("federation-host/0.1")
//!     .build()?;
//! let manifest: serde_json::Value = client
//!     .get("https://clinical-flags.example.com/remoteEntry.json")
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{UserAgentLayer, UserAgentService};
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody};
