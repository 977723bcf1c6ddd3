//! Error taxonomy of the federation runtime.

use std::fmt;

use semver::Version;
use thiserror::Error;

use crate::manifest::ManifestError;
use crate::source::FetchError;

/// Registry population and lookup errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("{entry} '{name}' is already registered")]
    Duplicate { entry: &'static str, name: String },

    /// Registration attempted after the first lookup
    #[error("registry is read-only; cannot register {entry} '{name}'")]
    Sealed { entry: &'static str, name: String },

    #[error("unknown remote '{name}'")]
    UnknownRemote { name: String },
}

impl RegistryError {
    #[must_use]
    pub fn duplicate(entry: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            entry,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn sealed(entry: &'static str, name: impl Into<String>) -> Self {
        Self::Sealed {
            entry,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn unknown_remote(name: impl Into<String>) -> Self {
        Self::UnknownRemote { name: name.into() }
    }
}

/// Shared scope negotiation failures. A failed negotiation binds nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NegotiationError {
    #[error(
        "shared dependency '{dependency}' is bound to {bound_version}, cannot bind {requested_version}"
    )]
    DependencyConflict {
        dependency: String,
        bound_version: Version,
        requested_version: Version,
    },

    #[error(
        "shared dependency '{dependency}' requires at least {minimum_version}, got {requested_version}"
    )]
    BelowMinimumVersion {
        dependency: String,
        minimum_version: Version,
        requested_version: Version,
    },

    #[error("eager shared dependency '{dependency}' has no host-provided instance")]
    EagerDependencyUnavailable { dependency: String },
}

impl NegotiationError {
    #[must_use]
    pub fn dependency(&self) -> &str {
        match self {
            Self::DependencyConflict { dependency, .. }
            | Self::BelowMinimumVersion { dependency, .. }
            | Self::EagerDependencyUnavailable { dependency } => dependency,
        }
    }
}

/// User-facing failure taxonomy; every [`LoadError`] maps onto one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnknownRemote,
    NetworkError,
    ManifestParseError,
    DependencyConflict,
    EagerDependencyUnavailable,
    UnknownExposedUnit,
    InstantiationError,
    RenderFault,
    /// The mount was torn down before the load settled; never shown to users
    Cancelled,
}

impl FailureKind {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::UnknownRemote => "unknown_remote",
            Self::NetworkError => "network_error",
            Self::ManifestParseError => "manifest_parse_error",
            Self::DependencyConflict => "dependency_conflict",
            Self::EagerDependencyUnavailable => "eager_dependency_unavailable",
            Self::UnknownExposedUnit => "unknown_exposed_unit",
            Self::InstantiationError => "instantiation_error",
            Self::RenderFault => "render_fault",
            Self::Cancelled => "cancelled",
        }
    }

    /// Short human-readable explanation for fallback output.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::UnknownRemote => "This application is not configured.",
            Self::NetworkError => "The application could not be reached.",
            Self::ManifestParseError => "The application published an invalid manifest.",
            Self::DependencyConflict => {
                "The application requires a library version this page cannot provide."
            }
            Self::EagerDependencyUnavailable => {
                "A library the application needs at startup is not available."
            }
            Self::UnknownExposedUnit => "The application does not provide this component.",
            Self::InstantiationError => "The component failed to start.",
            Self::RenderFault => "The component stopped working while displaying.",
            Self::Cancelled => "Loading was cancelled.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Typed outcome of a failed [`RemoteLoader::load`](crate::RemoteLoader::load)
/// or of a unit render.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LoadError {
    #[error("unknown remote '{remote}'")]
    UnknownRemote { remote: String },

    #[error("failed to fetch manifest of '{remote}' from {locator}")]
    Network {
        remote: String,
        locator: String,
        #[source]
        source: FetchError,
    },

    #[error("invalid manifest from '{remote}'")]
    ManifestParse {
        remote: String,
        #[source]
        source: ManifestError,
    },

    #[error("shared scope negotiation failed for '{remote}'")]
    Negotiation {
        remote: String,
        #[source]
        source: NegotiationError,
    },

    #[error("remote '{remote}' does not expose '{unit}'")]
    UnknownExposedUnit { remote: String, unit: String },

    #[error("failed to instantiate '{unit}' from '{remote}': {message}")]
    Instantiation {
        remote: String,
        unit: String,
        message: String,
    },

    #[error("'{unit}' from '{remote}' failed while rendering: {message}")]
    RenderFault {
        remote: String,
        unit: String,
        message: String,
    },

    #[error("load of '{unit}' from '{remote}' was cancelled")]
    Cancelled { remote: String, unit: String },
}

impl LoadError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnknownRemote { .. } => FailureKind::UnknownRemote,
            Self::Network { .. } => FailureKind::NetworkError,
            Self::ManifestParse { .. } => FailureKind::ManifestParseError,
            Self::Negotiation { source, .. } => match source {
                NegotiationError::DependencyConflict { .. }
                | NegotiationError::BelowMinimumVersion { .. } => FailureKind::DependencyConflict,
                NegotiationError::EagerDependencyUnavailable { .. } => {
                    FailureKind::EagerDependencyUnavailable
                }
            },
            Self::UnknownExposedUnit { .. } => FailureKind::UnknownExposedUnit,
            Self::Instantiation { .. } => FailureKind::InstantiationError,
            Self::RenderFault { .. } => FailureKind::RenderFault,
            Self::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    #[must_use]
    pub fn remote(&self) -> &str {
        match self {
            Self::UnknownRemote { remote }
            | Self::Network { remote, .. }
            | Self::ManifestParse { remote, .. }
            | Self::Negotiation { remote, .. }
            | Self::UnknownExposedUnit { remote, .. }
            | Self::Instantiation { remote, .. }
            | Self::RenderFault { remote, .. }
            | Self::Cancelled { remote, .. } => remote,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn registry_error_constructors() {
        assert!(matches!(
            RegistryError::duplicate("remote", "clinical"),
            RegistryError::Duplicate { entry: "remote", .. }
        ));
        assert!(matches!(
            RegistryError::sealed("shared dependency", "react"),
            RegistryError::Sealed { .. }
        ));
        assert_eq!(
            RegistryError::unknown_remote("nope").to_string(),
            "unknown remote 'nope'"
        );
    }

    #[test]
    fn negotiation_errors_map_to_failure_kinds() {
        let conflict = LoadError::Negotiation {
            remote: "clinical".to_owned(),
            source: NegotiationError::DependencyConflict {
                dependency: "react".to_owned(),
                bound_version: Version::new(19, 1, 0),
                requested_version: Version::new(18, 2, 0),
            },
        };
        assert_eq!(conflict.kind(), FailureKind::DependencyConflict);

        let below = LoadError::Negotiation {
            remote: "clinical".to_owned(),
            source: NegotiationError::BelowMinimumVersion {
                dependency: "react".to_owned(),
                minimum_version: Version::new(19, 0, 0),
                requested_version: Version::new(18, 2, 0),
            },
        };
        assert_eq!(below.kind(), FailureKind::DependencyConflict);

        let eager = LoadError::Negotiation {
            remote: "clinical".to_owned(),
            source: NegotiationError::EagerDependencyUnavailable {
                dependency: "react-dom".to_owned(),
            },
        };
        assert_eq!(eager.kind(), FailureKind::EagerDependencyUnavailable);
    }

    #[test]
    fn load_error_exposes_remote_name() {
        let err = LoadError::UnknownExposedUnit {
            remote: "clinical".to_owned(),
            unit: "Missing".to_owned(),
        };
        assert_eq!(err.remote(), "clinical");
        assert_eq!(err.kind(), FailureKind::UnknownExposedUnit);
        assert!(!err.is_cancelled());
    }

    #[test]
    fn failure_codes_are_stable() {
        assert_eq!(FailureKind::NetworkError.code(), "network_error");
        assert_eq!(FailureKind::RenderFault.to_string(), "render_fault");
    }
}
