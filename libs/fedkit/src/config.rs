//! Layered host configuration.
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults
//! 2. optional YAML file
//! 3. environment variables prefixed with `PULSEGRID__` (`__` separates nesting,
//!    e.g. `PULSEGRID__HTTP__REQUEST_TIMEOUT_MS=5000`)
//! 4. CLI overrides applied by the binary
//!
//! ```yaml
//! mode: development
//! name: pulsegrid-host
//! remotes:
//!   clinicalFlagsMfe:
//!     development: http://localhost:3001/remoteEntry.json
//!     production: https://clinical-flags.example.com/remoteEntry.json
//!   billing: billing@https://billing.example.com/remoteEntry.json
//! shared:
//!   react: { singleton: true, required_version: "^19.1.0", version: "19.1.0" }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use fedkit_http::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{RemoteDescriptor, SharedDependencyDescriptor, parse_minimum_version};
use crate::error::RegistryError;
use crate::registry::FederationRegistry;

pub const ENV_PREFIX: &str = "PULSEGRID__";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("remote '{remote}' has no locator for {mode} mode")]
    MissingLocator { remote: String, mode: DeploymentMode },

    #[error("remote '{remote}' locator names remote '{declared}'")]
    RemoteNameMismatch { remote: String, declared: String },

    #[error("shared dependency '{dependency}' has invalid version '{value}'")]
    InvalidVersion {
        dependency: String,
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Development,
    Production,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Where a remote lives, either per mode or as a single spec string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteLocation {
    /// `url` or `name@url`
    Spec(String),
    PerMode {
        #[serde(default)]
        development: Option<String>,
        #[serde(default)]
        production: Option<String>,
    },
}

/// Split `name@url`; a plain URL has no name part.
#[must_use]
pub fn parse_remote_spec(spec: &str) -> (Option<&str>, &str) {
    match spec.split_once('@') {
        Some((name, url)) if !name.is_empty() && !name.contains("://") => (Some(name), url),
        _ => (None, spec),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedPolicy {
    pub singleton: bool,
    pub eager: bool,
    pub strict: bool,
    /// Minimum version, plain or as a requirement such as `^19.1.0`
    pub required_version: Option<String>,
    /// Version the host itself provides
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout; unset means no timeout
    pub request_timeout_ms: Option<u64>,
    pub max_body_size: Option<usize>,
    pub user_agent: Option<String>,
    /// Use the OS certificate store instead of the bundled roots
    pub native_roots: bool,
    /// Defaults to allowed in development mode only
    pub allow_insecure_http: Option<bool>,
}

impl HttpConfig {
    #[must_use]
    pub fn client_config(&self, mode: DeploymentMode) -> HttpClientConfig {
        let defaults = HttpClientConfig::default();
        let insecure = self
            .allow_insecure_http
            .unwrap_or(mode == DeploymentMode::Development);
        HttpClientConfig {
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            max_body_size: self.max_body_size.unwrap_or(defaults.max_body_size),
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| defaults.user_agent.clone()),
            transport: if insecure {
                TransportSecurity::AllowInsecureHttp
            } else {
                TransportSecurity::TlsOnly
            },
            tls_roots: if self.native_roots {
                TlsRootConfig::Native
            } else {
                TlsRootConfig::WebPki
            },
            ..defaults
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub mode: DeploymentMode,
    /// Name of this host
    pub name: String,
    pub remotes: BTreeMap<String, RemoteLocation>,
    pub shared: BTreeMap<String, SharedPolicy>,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::default(),
            name: "host".to_owned(),
            remotes: BTreeMap::new(),
            shared: BTreeMap::new(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FederationConfig {
    /// Defaults, then `path` (if any), then the environment.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// # Errors
    /// Returns `ConfigError::Load` when a layer cannot be read or extracted.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(path).extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Locator of `remote` for the active mode, resolved once.
    ///
    /// # Errors
    /// `MissingLocator` when no locator exists for the mode,
    /// `RemoteNameMismatch` when a `name@url` spec names another remote.
    pub fn resolve_locator(
        &self,
        remote: &str,
        location: &RemoteLocation,
    ) -> Result<String, ConfigError> {
        let spec = match location {
            RemoteLocation::Spec(spec) => Some(spec),
            RemoteLocation::PerMode {
                development,
                production,
            } => match self.mode {
                DeploymentMode::Development => development.as_ref(),
                DeploymentMode::Production => production.as_ref(),
            },
        };
        let spec = spec.ok_or_else(|| ConfigError::MissingLocator {
            remote: remote.to_owned(),
            mode: self.mode,
        })?;

        let (declared, url) = parse_remote_spec(spec);
        if let Some(declared) = declared
            && declared != remote
        {
            return Err(ConfigError::RemoteNameMismatch {
                remote: remote.to_owned(),
                declared: declared.to_owned(),
            });
        }
        Ok(url.to_owned())
    }

    /// Resolve every remote for the active mode and populate a registry.
    ///
    /// # Errors
    /// Any locator or version error, or a registry rejection.
    pub fn build_registry(&self) -> Result<FederationRegistry, ConfigError> {
        let registry = FederationRegistry::new();

        for (name, location) in &self.remotes {
            let locator = self.resolve_locator(name, location)?;
            registry.register_remote(RemoteDescriptor::new(name, locator))?;
        }

        for (name, policy) in &self.shared {
            let mut descriptor = SharedDependencyDescriptor::new(name)
                .singleton(policy.singleton)
                .eager(policy.eager)
                .strict(policy.strict);
            if let Some(raw) = &policy.required_version {
                let minimum = parse_minimum_version(raw).map_err(|source| {
                    invalid_version(name, raw, source)
                })?;
                descriptor = descriptor.minimum_version(minimum);
            }
            registry.register_shared(descriptor)?;

            if let Some(raw) = &policy.version {
                let version =
                    Version::parse(raw.trim()).map_err(|source| invalid_version(name, raw, source))?;
                registry.register_shared_instance(name, version)?;
            }
        }

        tracing::info!(
            host = %self.name,
            mode = %self.mode,
            remotes = self.remotes.len(),
            shared = self.shared.len(),
            "federation registry built"
        );
        Ok(registry)
    }
}

fn invalid_version(dependency: &str, value: &str, source: semver::Error) -> ConfigError {
    ConfigError::InvalidVersion {
        dependency: dependency.to_owned(),
        value: value.to_owned(),
        source,
    }
}
