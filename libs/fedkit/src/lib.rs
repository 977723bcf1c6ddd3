#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Federation runtime for independently deployed UI units.
//!
//! A host registers which remotes exist and which libraries are shared, then
//! mounts exposed units through [`MountBoundary`]. Each boundary drives its own
//! `Loading -> Ready | Failed` state machine on top of [`RemoteLoader`], which
//! fetches the remote manifest, negotiates shared dependency versions with the
//! [`SharedScopeNegotiator`] and links the unit from the [`UnitCatalog`].
//!
//! Failures never escape a boundary: every load error and every panic raised
//! while a unit renders ends up as a rendered [`FailureNotice`].
//!
//! ```ignore
//! let registry = Arc::new(config.build_registry()?);
//! let loader = Arc::new(RemoteLoader::new(registry, source, catalog));
//! loader.negotiate_host()?;
//!
//! let boundary = MountBoundary::mount(loader, MountRequest::new("clinical", "ClinicalFlagsWidget", props));
//! println!("{}", boundary.render());
//! ```

pub mod boundary;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod failure;
pub mod loader;
pub mod manifest;
pub mod negotiator;
pub mod properties;
pub mod registry;
pub mod source;
pub mod telemetry;
pub mod unit;
pub mod view;

pub use boundary::{MountBoundary, MountFailure, MountId, MountRequest, MountState};
pub use config::{
    ConfigError, DeploymentMode, FederationConfig, HttpConfig, LogFormat, LoggingConfig,
    RemoteLocation, SharedPolicy,
};
pub use descriptor::{EntryFormat, RemoteDescriptor, SharedDependencyDescriptor};
pub use error::{FailureKind, LoadError, NegotiationError, RegistryError};
pub use failure::FailureNotice;
pub use loader::RemoteLoader;
pub use manifest::{ExposedUnit, ManifestError, RemoteManifest};
pub use negotiator::{
    BindOutcome, BindingTable, CompatibilityWarning, NegotiationOutcome, SharedRequirement,
    SharedScopeNegotiator, WarningReason,
};
pub use properties::{Callback, PropValue, Properties};
pub use registry::FederationRegistry;
pub use source::{FetchError, HttpManifestSource, ManifestSource, StaticManifestSource};
pub use telemetry::init_logging;
pub use unit::{Unit, UnitCatalog, UnitError, UnitFactory, UnitHandle};
pub use view::Node;
