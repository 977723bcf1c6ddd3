//! Remote manifest: the JSON document a remote publishes at its locator.
//!
//! ```json
//! {
//!   "name": "clinicalFlagsMfe",
//!   "exposes": { "./ClinicalFlagsWidget": { "module": "clinical_flags::widget" } },
//!   "shared": { "react": { "version": "19.1.0" } }
//! }
//! ```
//!
//! Manifests are untrusted input and are validated before any field is used.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::negotiator::SharedRequirement;

const EXPOSE_PREFIX: &str = "./";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ManifestError {
    #[error("malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("manifest is published by '{found}', expected '{expected}'")]
    NameMismatch { expected: String, found: String },

    #[error("exposed unit '{unit}' has an empty module id")]
    EmptyModule { unit: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedUnit {
    /// Catalog key the host links the unit through
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedRequest {
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteManifest {
    pub name: String,
    #[serde(default)]
    pub exposes: BTreeMap<String, ExposedUnit>,
    #[serde(default)]
    pub shared: BTreeMap<String, SharedRequest>,
}

impl RemoteManifest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exposes: BTreeMap::new(),
            shared: BTreeMap::new(),
        }
    }

    /// Expose `unit` (stored with the `./` prefix) backed by catalog `module`.
    #[must_use]
    pub fn expose(mut self, unit: &str, module: impl Into<String>) -> Self {
        let key = if unit.starts_with(EXPOSE_PREFIX) {
            unit.to_owned()
        } else {
            format!("{EXPOSE_PREFIX}{unit}")
        };
        self.exposes.insert(
            key,
            ExposedUnit {
                module: module.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn share(mut self, dependency: impl Into<String>, version: Version) -> Self {
        self.shared
            .insert(dependency.into(), SharedRequest { version });
        self
    }

    /// Parse and validate a fetched manifest for the remote registered as
    /// `expected_name`.
    ///
    /// # Errors
    /// Returns `Malformed` for invalid JSON or versions, `NameMismatch` when the
    /// manifest belongs to another remote, `EmptyModule` for blank module ids.
    pub fn parse(bytes: &[u8], expected_name: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_slice(bytes)?;

        if manifest.name != expected_name {
            return Err(ManifestError::NameMismatch {
                expected: expected_name.to_owned(),
                found: manifest.name,
            });
        }

        if let Some((unit, _)) = manifest
            .exposes
            .iter()
            .find(|(_, exposed)| exposed.module.trim().is_empty())
        {
            return Err(ManifestError::EmptyModule { unit: unit.clone() });
        }

        Ok(manifest)
    }

    /// Look up an exposed unit; `Widget` and `./Widget` are equivalent.
    #[must_use]
    pub fn exposed(&self, unit: &str) -> Option<&ExposedUnit> {
        let bare = unit.strip_prefix(EXPOSE_PREFIX).unwrap_or(unit);
        self.exposes.get(&format!("{EXPOSE_PREFIX}{bare}")).or_else(|| self.exposes.get(bare))
    }

    #[must_use]
    pub fn shared_requirements(&self) -> Vec<SharedRequirement> {
        self.shared
            .iter()
            .map(|(name, request)| SharedRequirement::new(name.clone(), request.version.clone()))
            .collect()
    }
}
