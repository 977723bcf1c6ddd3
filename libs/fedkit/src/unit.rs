//! Loadable units and the catalog they are linked from.
//!
//! Remote code is never looked up ambiently: a host links a remote's units by
//! registering a [`UnitFactory`] per module id in its [`UnitCatalog`]. The
//! manifest's `exposes` table maps unit names onto those module ids.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::error::LoadError;
use crate::properties::Properties;
use crate::view::Node;

/// Failure reported by a unit or its factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UnitError {
    message: String,
}

impl UnitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::new(format!("panicked: {detail}"))
    }
}

/// A component that turns properties into output.
///
/// Units must be pure with respect to `props`; they signal events upward only
/// by invoking callback properties.
pub trait Unit: Send + Sync {
    /// # Errors
    /// Returns a `UnitError` when the unit cannot produce output.
    fn render(&self, props: &Properties) -> Result<Node, UnitError>;
}

/// Creates a unit instance when a remote is linked.
pub trait UnitFactory: Send + Sync {
    /// # Errors
    /// Returns a `UnitError` when the unit cannot be created.
    fn instantiate(&self) -> Result<Arc<dyn Unit>, UnitError>;
}

impl<F> UnitFactory for F
where
    F: Fn() -> Result<Arc<dyn Unit>, UnitError> + Send + Sync,
{
    fn instantiate(&self) -> Result<Arc<dyn Unit>, UnitError> {
        self()
    }
}

/// Module id -> factory table.
#[derive(Default)]
pub struct UnitCatalog {
    factories: RwLock<HashMap<String, Arc<dyn UnitFactory>>>,
}

impl UnitCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for `module`. Re-registering replaces it.
    pub fn register(&self, module: impl Into<String>, factory: Arc<dyn UnitFactory>) {
        let module = module.into();
        tracing::debug!(%module, "registered unit factory");
        self.factories.write().insert(module, factory);
    }

    #[must_use]
    pub fn contains(&self, module: &str) -> bool {
        self.factories.read().contains_key(module)
    }

    /// Instantiate `module` as the unit `unit` of `remote`.
    ///
    /// Panics raised by the factory are caught and reported as
    /// [`LoadError::Instantiation`].
    pub(crate) fn link(&self, remote: &str, unit: &str, module: &str) -> Result<UnitHandle, LoadError> {
        let instantiation_error = |message: String| LoadError::Instantiation {
            remote: remote.to_owned(),
            unit: unit.to_owned(),
            message,
        };

        let factory = self
            .factories
            .read()
            .get(module)
            .cloned()
            .ok_or_else(|| instantiation_error(format!("module '{module}' is not linked into this host")))?;

        let instance = match catch_unwind(AssertUnwindSafe(|| factory.instantiate())) {
            Ok(Ok(instance)) => instance,
            Ok(Err(err)) => return Err(instantiation_error(err.message)),
            Err(payload) => {
                return Err(instantiation_error(
                    UnitError::from_panic(payload.as_ref()).message,
                ));
            }
        };

        Ok(UnitHandle {
            remote: remote.to_owned(),
            unit: unit.to_owned(),
            module: module.to_owned(),
            instance,
        })
    }
}

/// A linked unit, reusable for any number of renders.
#[derive(Clone)]
pub struct UnitHandle {
    remote: String,
    unit: String,
    module: String,
    instance: Arc<dyn Unit>,
}

impl UnitHandle {
    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Render with panics converted into errors.
    ///
    /// # Errors
    /// Returns the unit's own error, or a `UnitError` describing the panic.
    pub fn render(&self, props: &Properties) -> Result<Node, UnitError> {
        match catch_unwind(AssertUnwindSafe(|| self.instance.render(props))) {
            Ok(result) => result,
            Err(payload) => Err(UnitError::from_panic(payload.as_ref())),
        }
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("remote", &self.remote)
            .field("unit", &self.unit)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
