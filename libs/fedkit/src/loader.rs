//! Fetch-and-link sequence for one exposed unit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{LoadError, NegotiationError};
use crate::manifest::RemoteManifest;
use crate::negotiator::{NegotiationOutcome, SharedRequirement, SharedScopeNegotiator};
use crate::registry::FederationRegistry;
use crate::source::ManifestSource;
use crate::unit::{UnitCatalog, UnitHandle};

/// Requester name used when the host negotiates its own shared instances.
pub const HOST_REQUESTER: &str = "host";

pub struct RemoteLoader {
    registry: Arc<FederationRegistry>,
    source: Arc<dyn ManifestSource>,
    catalog: Arc<UnitCatalog>,
    negotiator: SharedScopeNegotiator,
}

impl RemoteLoader {
    #[must_use]
    pub fn new(
        registry: Arc<FederationRegistry>,
        source: Arc<dyn ManifestSource>,
        catalog: Arc<UnitCatalog>,
    ) -> Self {
        let negotiator = SharedScopeNegotiator::new(Arc::clone(&registry));
        Self {
            registry,
            source,
            catalog,
            negotiator,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &FederationRegistry {
        &self.registry
    }

    #[must_use]
    pub fn negotiator(&self) -> &SharedScopeNegotiator {
        &self.negotiator
    }

    #[must_use]
    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    /// Bind the host's own shared instances before any remote negotiates.
    ///
    /// # Errors
    /// Returns the negotiation error if the host instances violate their own
    /// descriptors (for example a strict minimum above the shipped version).
    pub fn negotiate_host(&self) -> Result<NegotiationOutcome, NegotiationError> {
        let requirements: Vec<SharedRequirement> = self
            .registry
            .shared_instances()
            .into_iter()
            .map(|(name, version)| SharedRequirement::new(name, version))
            .collect();
        self.negotiator.negotiate(HOST_REQUESTER, &requirements)
    }

    /// Resolve `unit` exposed by `remote`.
    ///
    /// Steps: registry lookup, manifest fetch, shared scope negotiation,
    /// exposed unit lookup, link. Cancelling `cancel` while the fetch is
    /// outstanding, or before its result is used, yields
    /// [`LoadError::Cancelled`] and leaves the binding table untouched.
    /// There is no retry and no timeout at this level.
    ///
    /// # Errors
    /// Any [`LoadError`]; see [`LoadError::kind`] for the user-facing taxonomy.
    #[instrument(name = "federation.load", skip_all, fields(remote = %remote, unit = %unit))]
    pub async fn load(
        &self,
        remote: &str,
        unit: &str,
        cancel: &CancellationToken,
    ) -> Result<UnitHandle, LoadError> {
        let cancelled = || LoadError::Cancelled {
            remote: remote.to_owned(),
            unit: unit.to_owned(),
        };

        let descriptor =
            self.registry
                .lookup_remote(remote)
                .map_err(|_| LoadError::UnknownRemote {
                    remote: remote.to_owned(),
                })?;

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled()),
            result = self.source.fetch(&descriptor) => result,
        };
        if cancel.is_cancelled() {
            tracing::debug!("cancelled after fetch; discarding manifest");
            return Err(cancelled());
        }

        let bytes = fetched.map_err(|source| LoadError::Network {
            remote: remote.to_owned(),
            locator: descriptor.locator.clone(),
            source,
        })?;
        tracing::debug!(bytes = bytes.len(), "manifest fetched");

        let manifest = RemoteManifest::parse(&bytes, &descriptor.name).map_err(|source| {
            LoadError::ManifestParse {
                remote: remote.to_owned(),
                source,
            }
        })?;

        let Some(outcome) = self
            .negotiator
            .negotiate_unless_cancelled(remote, &manifest.shared_requirements(), cancel)
            .map_err(|source| LoadError::Negotiation {
                remote: remote.to_owned(),
                source,
            })?
        else {
            return Err(cancelled());
        };
        tracing::debug!(
            resolved = outcome.resolved.len(),
            ignored = outcome.ignored.len(),
            "shared scope negotiated"
        );

        let exposed = manifest
            .exposed(unit)
            .ok_or_else(|| LoadError::UnknownExposedUnit {
                remote: remote.to_owned(),
                unit: unit.to_owned(),
            })?;

        let handle = self.catalog.link(remote, unit, &exposed.module)?;
        tracing::info!(module = %exposed.module, "unit linked");
        Ok(handle)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::descriptor::{RemoteDescriptor, SharedDependencyDescriptor};
    use crate::error::FailureKind;
    use crate::source::StaticManifestSource;
    use crate::unit::{Unit, UnitError};
    use crate::view::Node;
    use crate::{Properties, RemoteManifest};
    use semver::Version;

    const LOCATOR: &str = "mem://flags/remoteEntry.json";

    struct Widget;

    impl Unit for Widget {
        fn render(&self, _props: &Properties) -> Result<Node, UnitError> {
            Ok(Node::text("widget"))
        }
    }

    fn widget_factory() -> Result<Arc<dyn Unit>, UnitError> {
        Ok(Arc::new(Widget))
    }

    fn loader_with(source: StaticManifestSource, shared: Vec<SharedDependencyDescriptor>) -> RemoteLoader {
        let registry = FederationRegistry::new();
        registry
            .register_remote(RemoteDescriptor::new("flags", LOCATOR))
            .unwrap();
        for descriptor in shared {
            registry.register_shared(descriptor).unwrap();
        }
        let catalog = UnitCatalog::new();
        catalog.register("flags::widget", Arc::new(widget_factory));
        RemoteLoader::new(Arc::new(registry), Arc::new(source), Arc::new(catalog))
    }

    fn manifest() -> RemoteManifest {
        RemoteManifest::new("flags").expose("Widget", "flags::widget")
    }

    #[tokio::test]
    async fn loads_exposed_unit() {
        let source = StaticManifestSource::new()
            .with_manifest(LOCATOR, &manifest())
            .unwrap();
        let loader = loader_with(source, vec![]);

        let handle = loader
            .load("flags", "Widget", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.module(), "flags::widget");
    }

    #[tokio::test]
    async fn unknown_remote_does_not_panic() {
        let loader = loader_with(StaticManifestSource::new(), vec![]);
        let err = loader
            .load("billing", "Widget", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnknownRemote);
    }

    #[tokio::test]
    async fn network_failure_is_network_error() {
        let source = StaticManifestSource::new().with_failure(LOCATOR, "connection refused");
        let loader = loader_with(source, vec![]);

        let err = loader
            .load("flags", "Widget", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NetworkError);
    }

    #[tokio::test]
    async fn malformed_manifest_is_parse_error() {
        let source = StaticManifestSource::new().with_raw(LOCATOR, "<html>502</html>");
        let loader = loader_with(source, vec![]);

        let err = loader
            .load("flags", "Widget", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ManifestParseError);
    }

    #[tokio::test]
    async fn missing_exposed_unit_is_reported_after_negotiation() {
        let source = StaticManifestSource::new()
            .with_manifest(
                LOCATOR,
                &manifest().share("react", Version::new(19, 1, 0)),
            )
            .unwrap();
        let loader = loader_with(
            source,
            vec![SharedDependencyDescriptor::new("react").singleton(true)],
        );

        let err = loader
            .load("flags", "Banner", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnknownExposedUnit);
        assert_eq!(
            loader.negotiator().bindings().bound_version("react"),
            Some(Version::new(19, 1, 0))
        );
    }

    #[tokio::test]
    async fn unlinked_module_is_instantiation_error() {
        let source = StaticManifestSource::new()
            .with_manifest(LOCATOR, &RemoteManifest::new("flags").expose("Widget", "flags::other"))
            .unwrap();
        let loader = loader_with(source, vec![]);

        let err = loader
            .load("flags", "Widget", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InstantiationError);
    }

    #[tokio::test]
    async fn cancelled_token_skips_negotiation() {
        let source = StaticManifestSource::new()
            .with_manifest(
                LOCATOR,
                &manifest().share("react", Version::new(19, 1, 0)),
            )
            .unwrap();
        let loader = loader_with(
            source,
            vec![SharedDependencyDescriptor::new("react").singleton(true)],
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = loader.load("flags", "Widget", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(loader.negotiator().bindings().is_empty());
    }

    #[tokio::test]
    async fn host_negotiation_binds_host_instances_first() {
        let registry = FederationRegistry::new();
        registry
            .register_shared(
                SharedDependencyDescriptor::new("react")
                    .singleton(true)
                    .strict(true),
            )
            .unwrap();
        registry
            .register_shared_instance("react", Version::new(19, 1, 0))
            .unwrap();
        let loader = RemoteLoader::new(
            Arc::new(registry),
            Arc::new(StaticManifestSource::new()),
            Arc::new(UnitCatalog::new()),
        );

        let outcome = loader.negotiate_host().unwrap();
        assert_eq!(outcome.newly_bound, vec!["react"]);
        assert_eq!(
            loader.negotiator().bindings().bound_version("react"),
            Some(Version::new(19, 1, 0))
        );
    }
}
