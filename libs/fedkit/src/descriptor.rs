//! Static descriptors populated into the registry at startup.

use semver::Version;

/// Format of the entry point a remote publishes at its locator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum EntryFormat {
    /// JSON manifest listing exposed units and shared requirements
    #[default]
    JsonManifest,
}

/// Where a remote lives. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    /// Federation key, unique per registry
    pub name: String,
    /// Manifest address, already resolved for the active deployment mode
    pub locator: String,
    pub entry_format: EntryFormat,
}

impl RemoteDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            entry_format: EntryFormat::default(),
        }
    }
}

/// Sharing policy for one library used by the host and its remotes.
///
/// Descriptors are not cross-checked at registration; incompatibilities
/// surface when a remote negotiates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDependencyDescriptor {
    pub name: String,
    /// At most one version may be bound for the whole process
    pub singleton: bool,
    /// A host-provided instance must exist before any remote code runs
    pub eager: bool,
    /// Lower bound; `None` accepts any version
    pub minimum_version: Option<Version>,
    /// Constraint violations fail negotiation instead of producing a warning
    pub strict: bool,
}

impl SharedDependencyDescriptor {
    /// Lazily bound, non-singleton, non-strict dependency with no minimum.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            singleton: false,
            eager: false,
            minimum_version: None,
            strict: false,
        }
    }

    #[must_use]
    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    #[must_use]
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn minimum_version(mut self, version: Version) -> Self {
        self.minimum_version = Some(version);
        self
    }
}

/// Parse a minimum version written either as a plain version (`19.1.0`) or as
/// a lower-bounded requirement (`^19.1.0`, `~19.1`, `>=19`).
///
/// Missing minor/patch components default to zero.
///
/// # Errors
/// Returns the semver error when the numeric part is not a valid version.
pub fn parse_minimum_version(raw: &str) -> Result<Version, semver::Error> {
    let trimmed = raw.trim();
    let numeric = trimmed
        .strip_prefix(">=")
        .or_else(|| trimmed.strip_prefix('^'))
        .or_else(|| trimmed.strip_prefix('~'))
        .or_else(|| trimmed.strip_prefix('='))
        .unwrap_or(trimmed)
        .trim();

    let dots = numeric.matches('.').count();
    match dots {
        0 => Version::parse(&format!("{numeric}.0.0")),
        1 => Version::parse(&format!("{numeric}.0")),
        _ => Version::parse(numeric),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_policy_flags() {
        let descriptor = SharedDependencyDescriptor::new("react")
            .singleton(true)
            .eager(true)
            .strict(true)
            .minimum_version(Version::new(19, 1, 0));

        assert!(descriptor.singleton);
        assert!(descriptor.eager);
        assert!(descriptor.strict);
        assert_eq!(descriptor.minimum_version, Some(Version::new(19, 1, 0)));
    }

    #[test]
    fn default_policy_is_lenient() {
        let descriptor = SharedDependencyDescriptor::new("lodash");
        assert!(!descriptor.singleton);
        assert!(!descriptor.eager);
        assert!(!descriptor.strict);
        assert!(descriptor.minimum_version.is_none());
    }

    #[test]
    fn parses_caret_and_plain_minimums() {
        assert_eq!(
            parse_minimum_version("^19.1.0").unwrap(),
            Version::new(19, 1, 0)
        );
        assert_eq!(
            parse_minimum_version("19.1.0").unwrap(),
            Version::new(19, 1, 0)
        );
        assert_eq!(parse_minimum_version(">= 2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(parse_minimum_version("~1.4").unwrap(), Version::new(1, 4, 0));
    }

    #[test]
    fn rejects_garbage_minimum() {
        assert!(parse_minimum_version("^latest").is_err());
    }

    #[test]
    fn remote_descriptor_defaults_to_json_manifest() {
        let remote = RemoteDescriptor::new("clinical", "https://cdn.example.com/remoteEntry.json");
        assert_eq!(remote.entry_format, EntryFormat::JsonManifest);
    }
}
