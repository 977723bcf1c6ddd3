#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Demonstration remote for the federation runtime.
//!
//! Exposes a single unit, [`ClinicalFlagsWidget`], under the remote name
//! `clinicalFlagsMfe`. A host links it with [`register`]; the remote
//! publishes its manifest over HTTP through [`api::rest::router`].

pub mod api;
pub mod widget;

use std::sync::Arc;

use fedkit::{RemoteManifest, UnitCatalog};
use semver::Version;

pub use widget::{ClinicalFlag, ClinicalFlagsWidget, FlagType};

pub const REMOTE_NAME: &str = "clinicalFlagsMfe";
pub const WIDGET_UNIT: &str = "ClinicalFlagsWidget";
pub const WIDGET_MODULE: &str = "clinical_flags::widget";

/// Shared libraries this remote was built against.
#[must_use]
pub fn shared_versions() -> Vec<(&'static str, Version)> {
    vec![
        ("react", Version::new(19, 1, 0)),
        ("react-dom", Version::new(19, 1, 0)),
    ]
}

/// Manifest published at `/remoteEntry.json`.
#[must_use]
pub fn manifest() -> RemoteManifest {
    shared_versions().into_iter().fold(
        RemoteManifest::new(REMOTE_NAME).expose(WIDGET_UNIT, WIDGET_MODULE),
        |manifest, (name, version)| manifest.share(name, version),
    )
}

/// Link this remote's units into a host catalog.
pub fn register(catalog: &UnitCatalog) {
    catalog.register(WIDGET_MODULE, Arc::new(ClinicalFlagsWidget::create));
}
