//! Shared scope negotiation.
//!
//! Every singleton dependency is bound to exactly one version for the life of
//! the process. The first negotiation that binds a dependency wins; later
//! negotiations are read-only checks against that binding.
//!
//! A negotiation covers all requirements of one remote at once: it is planned
//! against a staged view of the [`BindingTable`] while holding the table lock
//! and committed only if every requirement is satisfied. Compatibility
//! warnings never travel through the return value; they go to the
//! [`SharedScopeNegotiator::subscribe_warnings`] channel and to `tracing`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use semver::Version;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::NegotiationError;
use crate::registry::FederationRegistry;

const WARNING_CHANNEL_CAPACITY: usize = 64;

/// One dependency version requested by a remote (or by the host itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedRequirement {
    pub name: String,
    pub version: Version,
}

impl SharedRequirement {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Result of a compare-and-set-once on a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The dependency was unbound and is now bound to the requested version
    Bound,
    /// Already bound to the requested version; nothing changed
    AlreadyBound,
    /// Bound to a different version, carried here; nothing changed
    Mismatch(Version),
}

/// Process-wide dependency -> bound version table.
#[derive(Default)]
pub struct BindingTable {
    bound: Mutex<HashMap<String, Version>>,
}

impl BindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `version` unless it is already bound.
    pub fn bind_once(&self, name: &str, version: &Version) -> BindOutcome {
        let mut bound = self.bound.lock();
        match bound.get(name) {
            Some(existing) if existing == version => BindOutcome::AlreadyBound,
            Some(existing) => BindOutcome::Mismatch(existing.clone()),
            None => {
                bound.insert(name.to_owned(), version.clone());
                BindOutcome::Bound
            }
        }
    }

    #[must_use]
    pub fn bound_version(&self, name: &str) -> Option<Version> {
        self.bound.lock().get(name).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Version> {
        self.bound
            .lock()
            .iter()
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bound.lock().is_empty()
    }

    /// Run `plan` against a staged view. Staged bindings are committed only
    /// when it returns `Ok` and `cancel` is still clear under the table lock;
    /// `Ok(None)` means the plan succeeded but nothing was written.
    fn transaction<T, E>(
        &self,
        cancel: Option<&CancellationToken>,
        plan: impl FnOnce(&mut StagedBindings<'_>) -> Result<T, E>,
    ) -> Result<Option<T>, E> {
        let mut bound = self.bound.lock();
        let mut staged = StagedBindings {
            committed: &bound,
            pending: HashMap::new(),
        };
        let value = plan(&mut staged)?;
        let pending = staged.pending;
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Ok(None);
        }
        bound.extend(pending);
        Ok(Some(value))
    }
}

struct StagedBindings<'a> {
    committed: &'a HashMap<String, Version>,
    pending: HashMap<String, Version>,
}

impl StagedBindings<'_> {
    fn get(&self, name: &str) -> Option<&Version> {
        self.pending.get(name).or_else(|| self.committed.get(name))
    }

    fn bind_once(&mut self, name: &str, version: &Version) -> BindOutcome {
        match self.get(name) {
            Some(existing) if existing == version => BindOutcome::AlreadyBound,
            Some(existing) => BindOutcome::Mismatch(existing.clone()),
            None => {
                self.pending.insert(name.to_owned(), version.clone());
                BindOutcome::Bound
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningReason {
    /// Non-strict singleton requested at a version other than the bound one;
    /// the requester shares the bound instance.
    SingletonVersionSkew,
    /// Non-strict dependency requested below its minimum version.
    BelowMinimumVersion { minimum_version: Version },
}

/// Non-fatal compatibility finding published on the warning channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityWarning {
    /// Remote (or host) whose negotiation produced the warning
    pub requester: String,
    pub dependency: String,
    /// Version the requester will actually use
    pub effective_version: Version,
    pub requested_version: Version,
    pub reason: WarningReason,
}

/// Successful negotiation result. Warnings are published separately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationOutcome {
    /// Effective version per shared dependency
    pub resolved: BTreeMap<String, Version>,
    /// Dependencies this negotiation bound for the first time
    pub newly_bound: Vec<String>,
    /// Requested dependencies with no shared descriptor
    pub ignored: Vec<String>,
}

pub struct SharedScopeNegotiator {
    registry: Arc<FederationRegistry>,
    table: BindingTable,
    warnings: broadcast::Sender<CompatibilityWarning>,
}

impl SharedScopeNegotiator {
    #[must_use]
    pub fn new(registry: Arc<FederationRegistry>) -> Self {
        let (warnings, _) = broadcast::channel(WARNING_CHANNEL_CAPACITY);
        Self {
            registry,
            table: BindingTable::new(),
            warnings,
        }
    }

    /// Receive compatibility warnings produced after this call.
    #[must_use]
    pub fn subscribe_warnings(&self) -> broadcast::Receiver<CompatibilityWarning> {
        self.warnings.subscribe()
    }

    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.table
    }

    /// Reconcile `requested` against the shared descriptors and the bound table.
    ///
    /// # Errors
    /// - `DependencyConflict` for a strict singleton already bound elsewhere;
    /// - `BelowMinimumVersion` for a strict dependency under its minimum;
    /// - `EagerDependencyUnavailable` when an eager dependency has neither a
    ///   host-provided instance nor a binding.
    pub fn negotiate(
        &self,
        requester: &str,
        requested: &[SharedRequirement],
    ) -> Result<NegotiationOutcome, NegotiationError> {
        Ok(self
            .negotiate_inner(requester, requested, None)?
            .unwrap_or_default())
    }

    /// [`negotiate`](Self::negotiate) on behalf of a load that may be torn
    /// down. `Ok(None)` when `cancel` fired before the commit: nothing was
    /// bound and no warning was published.
    ///
    /// # Errors
    /// As [`negotiate`](Self::negotiate).
    pub fn negotiate_unless_cancelled(
        &self,
        requester: &str,
        requested: &[SharedRequirement],
        cancel: &CancellationToken,
    ) -> Result<Option<NegotiationOutcome>, NegotiationError> {
        self.negotiate_inner(requester, requested, Some(cancel))
    }

    fn negotiate_inner(
        &self,
        requester: &str,
        requested: &[SharedRequirement],
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<NegotiationOutcome>, NegotiationError> {
        let committed = self.table.transaction(cancel, |staged| {
            let mut outcome = NegotiationOutcome::default();
            let mut warnings = Vec::new();

            for requirement in requested {
                let Some(descriptor) = self.registry.shared_descriptor(&requirement.name) else {
                    tracing::debug!(
                        requester,
                        dependency = %requirement.name,
                        "no shared descriptor; dependency is not shared"
                    );
                    outcome.ignored.push(requirement.name.clone());
                    continue;
                };

                if descriptor.eager
                    && self.registry.shared_instance(&descriptor.name).is_none()
                    && staged.get(&descriptor.name).is_none()
                {
                    return Err(NegotiationError::EagerDependencyUnavailable {
                        dependency: descriptor.name,
                    });
                }

                if let Some(minimum) = &descriptor.minimum_version
                    && requirement.version < *minimum
                {
                    if descriptor.strict {
                        return Err(NegotiationError::BelowMinimumVersion {
                            dependency: descriptor.name,
                            minimum_version: minimum.clone(),
                            requested_version: requirement.version.clone(),
                        });
                    }
                    warnings.push(CompatibilityWarning {
                        requester: requester.to_owned(),
                        dependency: descriptor.name.clone(),
                        effective_version: requirement.version.clone(),
                        requested_version: requirement.version.clone(),
                        reason: WarningReason::BelowMinimumVersion {
                            minimum_version: minimum.clone(),
                        },
                    });
                }

                let effective = if descriptor.singleton {
                    match staged.bind_once(&descriptor.name, &requirement.version) {
                        BindOutcome::Bound => {
                            outcome.newly_bound.push(descriptor.name.clone());
                            requirement.version.clone()
                        }
                        BindOutcome::AlreadyBound => requirement.version.clone(),
                        BindOutcome::Mismatch(bound_version) => {
                            if descriptor.strict {
                                return Err(NegotiationError::DependencyConflict {
                                    dependency: descriptor.name,
                                    bound_version,
                                    requested_version: requirement.version.clone(),
                                });
                            }
                            warnings.push(CompatibilityWarning {
                                requester: requester.to_owned(),
                                dependency: descriptor.name.clone(),
                                effective_version: bound_version.clone(),
                                requested_version: requirement.version.clone(),
                                reason: WarningReason::SingletonVersionSkew,
                            });
                            bound_version
                        }
                    }
                } else {
                    requirement.version.clone()
                };

                outcome.resolved.insert(descriptor.name, effective);
            }

            Ok((outcome, warnings))
        })?;
        let Some((outcome, warnings)) = committed else {
            tracing::debug!(requester, "negotiation abandoned; requester torn down");
            return Ok(None);
        };

        for name in &outcome.newly_bound {
            tracing::info!(requester, dependency = %name, version = %outcome.resolved[name], "bound shared dependency");
        }
        for warning in warnings {
            self.publish(warning);
        }

        Ok(Some(outcome))
    }

    fn publish(&self, warning: CompatibilityWarning) {
        match &warning.reason {
            WarningReason::SingletonVersionSkew => tracing::warn!(
                requester = %warning.requester,
                dependency = %warning.dependency,
                requested = %warning.requested_version,
                bound = %warning.effective_version,
                "singleton version skew; sharing the bound instance"
            ),
            WarningReason::BelowMinimumVersion { minimum_version } => tracing::warn!(
                requester = %warning.requester,
                dependency = %warning.dependency,
                requested = %warning.requested_version,
                minimum = %minimum_version,
                "shared dependency below minimum version"
            ),
        }
        // No subscribers is not an error.
        self.warnings.send(warning).ok();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::descriptor::SharedDependencyDescriptor;

    fn v(major: u64, minor: u64, patch: u64) -> Version {
        Version::new(major, minor, patch)
    }

    fn negotiator(descriptors: Vec<SharedDependencyDescriptor>) -> SharedScopeNegotiator {
        let registry = FederationRegistry::new();
        for d in descriptors {
            registry.register_shared(d).unwrap();
        }
        SharedScopeNegotiator::new(Arc::new(registry))
    }

    #[test]
    fn bind_once_is_compare_and_set_once() {
        let table = BindingTable::new();
        assert_eq!(table.bind_once("react", &v(19, 1, 0)), BindOutcome::Bound);
        assert_eq!(
            table.bind_once("react", &v(19, 1, 0)),
            BindOutcome::AlreadyBound
        );
        assert_eq!(
            table.bind_once("react", &v(18, 2, 0)),
            BindOutcome::Mismatch(v(19, 1, 0))
        );
        assert_eq!(table.bound_version("react"), Some(v(19, 1, 0)));
    }

    #[test]
    fn cancelled_negotiation_binds_and_publishes_nothing() {
        let n = negotiator(vec![SharedDependencyDescriptor::new("lib").singleton(true)]);
        n.negotiate("a", &[SharedRequirement::new("lib", v(1, 2, 0))])
            .unwrap();
        let before = n.bindings().snapshot();
        let mut warnings = n.subscribe_warnings();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = n
            .negotiate_unless_cancelled(
                "b",
                &[
                    SharedRequirement::new("lib", v(1, 3, 0)),
                    SharedRequirement::new("other", v(2, 0, 0)),
                ],
                &cancel,
            )
            .unwrap();

        assert_eq!(outcome, None);
        assert_eq!(n.bindings().snapshot(), before);
        assert!(warnings.try_recv().is_err());
    }

    #[test]
    fn cancelled_negotiation_still_reports_conflicts() {
        let n = negotiator(vec![
            SharedDependencyDescriptor::new("react")
                .singleton(true)
                .strict(true),
        ]);
        n.negotiate("host", &[SharedRequirement::new("react", v(19, 1, 0))])
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = n
            .negotiate_unless_cancelled(
                "clinical",
                &[SharedRequirement::new("react", v(18, 2, 0))],
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, NegotiationError::DependencyConflict { .. }));
    }

    #[test]
    fn live_token_commits_like_negotiate() {
        let n = negotiator(vec![SharedDependencyDescriptor::new("lib").singleton(true)]);
        let outcome = n
            .negotiate_unless_cancelled(
                "a",
                &[SharedRequirement::new("lib", v(1, 2, 0))],
                &CancellationToken::new(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(outcome.newly_bound, vec!["lib"]);
        assert_eq!(n.bindings().bound_version("lib"), Some(v(1, 2, 0)));
    }

    #[test]
    fn strict_singleton_conflict_fails() {
        let n = negotiator(vec![
            SharedDependencyDescriptor::new("react")
                .singleton(true)
                .strict(true),
        ]);

        n.negotiate("host", &[SharedRequirement::new("react", v(19, 1, 0))])
            .unwrap();
        let err = n
            .negotiate("clinical", &[SharedRequirement::new("react", v(18, 2, 0))])
            .unwrap_err();

        assert_eq!(
            err,
            NegotiationError::DependencyConflict {
                dependency: "react".to_owned(),
                bound_version: v(19, 1, 0),
                requested_version: v(18, 2, 0),
            }
        );
    }

    #[test]
    fn strict_singleton_matching_version_succeeds() {
        let n = negotiator(vec![
            SharedDependencyDescriptor::new("react")
                .singleton(true)
                .strict(true),
        ]);

        n.negotiate("host", &[SharedRequirement::new("react", v(19, 1, 0))])
            .unwrap();
        let outcome = n
            .negotiate("clinical", &[SharedRequirement::new("react", v(19, 1, 0))])
            .unwrap();
        assert_eq!(outcome.resolved["react"], v(19, 1, 0));
        assert!(outcome.newly_bound.is_empty());
    }

    #[test]
    fn repeated_negotiation_is_idempotent() {
        let n = negotiator(vec![SharedDependencyDescriptor::new("react").singleton(true)]);
        let mut warnings = n.subscribe_warnings();
        let request = [SharedRequirement::new("react", v(19, 1, 0))];

        let first = n.negotiate("clinical", &request).unwrap();
        let before = n.bindings().snapshot();
        let second = n.negotiate("clinical", &request).unwrap();

        assert_eq!(first.newly_bound, vec!["react"]);
        assert!(second.newly_bound.is_empty());
        assert_eq!(n.bindings().snapshot(), before);
        assert!(warnings.try_recv().is_err());
    }

    #[test]
    fn non_strict_singleton_skew_keeps_first_binding_and_warns() {
        let n = negotiator(vec![SharedDependencyDescriptor::new("lib").singleton(true)]);
        let mut warnings = n.subscribe_warnings();

        n.negotiate("a", &[SharedRequirement::new("lib", v(1, 2, 0))])
            .unwrap();
        let outcome = n
            .negotiate("b", &[SharedRequirement::new("lib", v(1, 3, 0))])
            .unwrap();

        assert_eq!(outcome.resolved["lib"], v(1, 2, 0));
        assert_eq!(n.bindings().bound_version("lib"), Some(v(1, 2, 0)));

        let warning = warnings.try_recv().unwrap();
        assert_eq!(warning.requester, "b");
        assert_eq!(warning.requested_version, v(1, 3, 0));
        assert_eq!(warning.effective_version, v(1, 2, 0));
        assert_eq!(warning.reason, WarningReason::SingletonVersionSkew);
    }

    #[test]
    fn eager_without_instance_fails() {
        let n = negotiator(vec![
            SharedDependencyDescriptor::new("react-dom")
                .singleton(true)
                .eager(true),
        ]);

        let err = n
            .negotiate("clinical", &[SharedRequirement::new("react-dom", v(19, 1, 0))])
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::EagerDependencyUnavailable { ref dependency } if dependency == "react-dom"
        ));
    }

    #[test]
    fn eager_with_host_instance_succeeds() {
        let registry = FederationRegistry::new();
        registry
            .register_shared(
                SharedDependencyDescriptor::new("react-dom")
                    .singleton(true)
                    .eager(true),
            )
            .unwrap();
        registry
            .register_shared_instance("react-dom", v(19, 1, 0))
            .unwrap();
        let n = SharedScopeNegotiator::new(Arc::new(registry));

        n.negotiate("clinical", &[SharedRequirement::new("react-dom", v(19, 1, 0))])
            .unwrap();
    }

    #[test]
    fn below_minimum_strict_fails_non_strict_warns() {
        let n = negotiator(vec![
            SharedDependencyDescriptor::new("react")
                .strict(true)
                .minimum_version(v(19, 0, 0)),
            SharedDependencyDescriptor::new("lodash").minimum_version(v(4, 17, 0)),
        ]);
        let mut warnings = n.subscribe_warnings();

        let err = n
            .negotiate("clinical", &[SharedRequirement::new("react", v(18, 2, 0))])
            .unwrap_err();
        assert!(matches!(err, NegotiationError::BelowMinimumVersion { .. }));

        let outcome = n
            .negotiate("clinical", &[SharedRequirement::new("lodash", v(4, 0, 0))])
            .unwrap();
        assert_eq!(outcome.resolved["lodash"], v(4, 0, 0));
        assert!(matches!(
            warnings.try_recv().unwrap().reason,
            WarningReason::BelowMinimumVersion { .. }
        ));
    }

    #[test]
    fn failed_negotiation_binds_nothing() {
        let n = negotiator(vec![
            SharedDependencyDescriptor::new("react").singleton(true),
            SharedDependencyDescriptor::new("react-dom")
                .singleton(true)
                .eager(true),
        ]);
        let mut warnings = n.subscribe_warnings();

        let err = n.negotiate(
            "clinical",
            &[
                SharedRequirement::new("react", v(19, 1, 0)),
                SharedRequirement::new("react-dom", v(19, 1, 0)),
            ],
        );

        assert!(err.is_err());
        assert!(n.bindings().is_empty());
        assert!(warnings.try_recv().is_err());
    }

    #[test]
    fn unshared_dependencies_are_ignored() {
        let n = negotiator(vec![]);
        let outcome = n
            .negotiate("clinical", &[SharedRequirement::new("left-pad", v(1, 0, 0))])
            .unwrap();
        assert_eq!(outcome.ignored, vec!["left-pad"]);
        assert!(outcome.resolved.is_empty());
        assert!(n.bindings().is_empty());
    }
}
