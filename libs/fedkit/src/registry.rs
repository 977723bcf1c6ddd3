//! Process-wide table of remotes and shared dependency policies.
//!
//! The registry has two phases:
//! - configuration: `register_*` calls populate it, duplicates are rejected;
//! - read-only: entered on the first lookup, after which every `register_*`
//!   call fails with [`RegistryError::Sealed`].
//!
//! Both tables are keyed by name and iterated in name order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use semver::Version;

use crate::descriptor::{RemoteDescriptor, SharedDependencyDescriptor};
use crate::error::RegistryError;

#[derive(Default)]
struct RegistryState {
    remotes: BTreeMap<String, RemoteDescriptor>,
    shared: BTreeMap<String, SharedDependencyDescriptor>,
    /// Versions of shared libraries the host itself provides.
    instances: BTreeMap<String, Version>,
}

#[derive(Default)]
pub struct FederationRegistry {
    state: RwLock<RegistryState>,
    sealed: AtomicBool,
}

impl FederationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `Duplicate` if the name is taken, `Sealed` after the first lookup.
    pub fn register_remote(&self, descriptor: RemoteDescriptor) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        self.ensure_open("remote", &descriptor.name)?;
        if state.remotes.contains_key(&descriptor.name) {
            return Err(RegistryError::duplicate("remote", descriptor.name));
        }
        tracing::info!(remote = %descriptor.name, locator = %descriptor.locator, "registered remote");
        state.remotes.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// # Errors
    /// `Duplicate` if the name is taken, `Sealed` after the first lookup.
    pub fn register_shared(
        &self,
        descriptor: SharedDependencyDescriptor,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        self.ensure_open("shared dependency", &descriptor.name)?;
        if state.shared.contains_key(&descriptor.name) {
            return Err(RegistryError::duplicate(
                "shared dependency",
                descriptor.name,
            ));
        }
        tracing::info!(
            dependency = %descriptor.name,
            singleton = descriptor.singleton,
            eager = descriptor.eager,
            strict = descriptor.strict,
            "registered shared dependency"
        );
        state.shared.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Record that the host ships `name` at `version`.
    ///
    /// # Errors
    /// `Duplicate` if an instance is already recorded, `Sealed` after the first lookup.
    pub fn register_shared_instance(
        &self,
        name: impl Into<String>,
        version: Version,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut state = self.state.write();
        self.ensure_open("shared instance", &name)?;
        if state.instances.contains_key(&name) {
            return Err(RegistryError::duplicate("shared instance", name));
        }
        tracing::debug!(dependency = %name, %version, "registered host-provided instance");
        state.instances.insert(name, version);
        Ok(())
    }

    /// # Errors
    /// `UnknownRemote` if no remote is registered under `name`.
    pub fn lookup_remote(&self, name: &str) -> Result<RemoteDescriptor, RegistryError> {
        self.seal();
        self.state
            .read()
            .remotes
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::unknown_remote(name))
    }

    #[must_use]
    pub fn lookup_shared_descriptors(&self) -> Vec<SharedDependencyDescriptor> {
        self.seal();
        self.state.read().shared.values().cloned().collect()
    }

    #[must_use]
    pub fn shared_descriptor(&self, name: &str) -> Option<SharedDependencyDescriptor> {
        self.seal();
        self.state.read().shared.get(name).cloned()
    }

    #[must_use]
    pub fn shared_instance(&self, name: &str) -> Option<Version> {
        self.seal();
        self.state.read().instances.get(name).cloned()
    }

    #[must_use]
    pub fn shared_instances(&self) -> Vec<(String, Version)> {
        self.seal();
        self.state
            .read()
            .instances
            .iter()
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect()
    }

    #[must_use]
    pub fn remote_names(&self) -> Vec<String> {
        self.seal();
        self.state.read().remotes.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            tracing::info!("federation registry sealed; entering read-only phase");
        }
    }

    fn ensure_open(&self, entry: &'static str, name: &str) -> Result<(), RegistryError> {
        if self.is_sealed() {
            return Err(RegistryError::sealed(entry, name));
        }
        Ok(())
    }
}
